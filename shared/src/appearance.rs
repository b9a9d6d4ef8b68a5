//! Avatar appearance: color, class and the class-driven proportions used for drawing

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 24-bit RGB color, written as `#rrggbb` on the command line and in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Self, ProtocolError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidColor(hex.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ProtocolError::InvalidColor(hex.to_string()))
        };

        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::rgb(0xe9, 0x45, 0x60)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::from_hex(s)
    }
}

/// Colors offered to players who do not pick one
pub const PALETTE: [Color; 8] = [
    Color::rgb(0xe9, 0x45, 0x60),
    Color::rgb(0x4a, 0x90, 0xd9),
    Color::rgb(0x2e, 0xcc, 0x71),
    Color::rgb(0xf1, 0xc4, 0x0f),
    Color::rgb(0x9b, 0x59, 0xb6),
    Color::rgb(0xe6, 0x7e, 0x22),
    Color::rgb(0x1a, 0xbc, 0x9c),
    Color::rgb(0xec, 0xf0, 0xf1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlayerClass {
    #[default]
    Warrior,
    Hunter,
    Mage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseStats {
    pub health: u32,
    pub mana: u32,
    pub strength: u32,
    pub agility: u32,
    pub intelligence: u32,
}

/// Scale factors applied to the avatar body and head
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proportions {
    pub body_scale: f32,
    pub head_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessory {
    Sword,
    Shield,
    Bow,
    Quiver,
    Staff,
    Hat,
}

impl PlayerClass {
    pub const ALL: [PlayerClass; 3] = [PlayerClass::Warrior, PlayerClass::Hunter, PlayerClass::Mage];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerClass::Warrior => "warrior",
            PlayerClass::Hunter => "hunter",
            PlayerClass::Mage => "mage",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerClass::Warrior => "Warrior",
            PlayerClass::Hunter => "Hunter",
            PlayerClass::Mage => "Mage",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PlayerClass::Warrior => {
                "A mighty fighter with heavy armor and devastating melee attacks."
            }
            PlayerClass::Hunter => "A swift ranger skilled with bows and tracking prey.",
            PlayerClass::Mage => "A powerful spellcaster wielding arcane magic.",
        }
    }

    pub fn base_stats(&self) -> BaseStats {
        match self {
            PlayerClass::Warrior => BaseStats {
                health: 120,
                mana: 30,
                strength: 15,
                agility: 8,
                intelligence: 5,
            },
            PlayerClass::Hunter => BaseStats {
                health: 90,
                mana: 50,
                strength: 10,
                agility: 15,
                intelligence: 8,
            },
            PlayerClass::Mage => BaseStats {
                health: 70,
                mana: 100,
                strength: 5,
                agility: 10,
                intelligence: 15,
            },
        }
    }

    pub fn proportions(&self) -> Proportions {
        match self {
            PlayerClass::Warrior => Proportions {
                body_scale: 1.2,
                head_scale: 1.0,
            },
            PlayerClass::Hunter => Proportions {
                body_scale: 1.0,
                head_scale: 1.0,
            },
            PlayerClass::Mage => Proportions {
                body_scale: 0.9,
                head_scale: 1.1,
            },
        }
    }

    pub fn accessories(&self) -> [Accessory; 2] {
        match self {
            PlayerClass::Warrior => [Accessory::Sword, Accessory::Shield],
            PlayerClass::Hunter => [Accessory::Bow, Accessory::Quiver],
            PlayerClass::Mage => [Accessory::Staff, Accessory::Hat],
        }
    }
}

impl fmt::Display for PlayerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for PlayerClass {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayerClass::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtocolError::UnknownClass(s.to_string()))
    }
}

/// How a peer looks for the whole of its session
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Appearance {
    pub color: Color,
    pub class: PlayerClass,
}
