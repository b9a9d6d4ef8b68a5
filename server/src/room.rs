use log::info;
use shared::{AnimationTag, PeerId, PeerInfo, RosterEntry, Vec3};
use std::collections::HashMap;

/// Default room every client joins
pub const DEFAULT_ROOM: &str = "main";

#[derive(Debug, Clone)]
pub struct Member {
    pub info: PeerInfo,
    pub position: Vec3,
    pub rotation: f32,
    pub animation: AnimationTag,
}

impl Member {
    fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            peer: self.info.clone(),
            position: self.position,
            rotation: self.rotation,
            animation: self.animation,
        }
    }
}

/// Presence room: who is here and where each member was last seen, so that
/// newcomers can be handed a roster. The relay never simulates movement.
#[derive(Debug)]
pub struct Room {
    code: String,
    members: HashMap<PeerId, Member>,
}

impl Room {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            members: HashMap::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Adds a member and returns the roster of everyone else already present.
    pub fn join(&mut self, info: PeerInfo, position: Vec3, rotation: f32) -> Vec<RosterEntry> {
        let roster = self.roster_excluding(info.id);

        info!(
            "{} joined room {} as peer {} ({} members)",
            info.display_name,
            self.code,
            info.id,
            self.members.len() + 1
        );
        self.members.insert(
            info.id,
            Member {
                info,
                position,
                rotation,
                animation: AnimationTag::Idle,
            },
        );

        roster
    }

    /// Stores the latest pose of a member. Returns false for unknown ids.
    pub fn update_pose(
        &mut self,
        id: PeerId,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
    ) -> bool {
        match self.members.get_mut(&id) {
            Some(member) => {
                member.position = position;
                member.rotation = rotation;
                member.animation = animation;
                true
            }
            None => false,
        }
    }

    pub fn leave(&mut self, id: PeerId) -> Option<PeerInfo> {
        let member = self.members.remove(&id)?;
        info!(
            "{} (peer {}) left room {}",
            member.info.display_name, id, self.code
        );
        Some(member.info)
    }

    pub fn entry(&self, id: PeerId) -> Option<RosterEntry> {
        self.members.get(&id).map(Member::roster_entry)
    }

    pub fn roster_excluding(&self, id: PeerId) -> Vec<RosterEntry> {
        self.members
            .values()
            .filter(|member| member.info.id != id)
            .map(Member::roster_entry)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
