//! Roster Tracking
//!
//! Maintains the visible participant set from transport presence events and
//! `user_joined`/`user_left` announcements. The local participant is created
//! once at connect time and is always present in every snapshot.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use super::protocol::Role;

/// Display name for peers that are connected but have not announced
/// themselves yet. Replaced when their `user_joined` arrives.
const UNANNOUNCED_NAME: &str = "?";

/// A participant visible in the room.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// Transport-assigned identity.
    pub identity: String,
    pub name: String,
    pub role: Role,
    pub joined_at: SystemTime,
}

/// The current participant set.
///
/// Remote peers' roles are not authoritatively known: without a `user_joined`
/// announcement a peer is presented as a viewer. Only the local participant's
/// role is certain.
#[derive(Debug)]
pub struct Roster {
    local: Participant,
    remote: HashMap<String, Participant>,
    /// Identities currently present at the transport level.
    connected: HashSet<String>,
}

impl Roster {
    pub fn new(local_identity: &str, local_name: &str, role: Role) -> Self {
        Self {
            local: Participant {
                identity: local_identity.to_string(),
                name: local_name.to_string(),
                role,
                joined_at: SystemTime::now(),
            },
            remote: HashMap::new(),
            connected: HashSet::new(),
        }
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    /// The transport saw a peer join the room. Unknown peers appear with a
    /// placeholder name until they announce. Returns whether the snapshot
    /// changed.
    pub fn peer_connected(&mut self, identity: &str) -> bool {
        if identity == self.local.identity {
            return false;
        }
        self.connected.insert(identity.to_string());
        if self.remote.contains_key(identity) {
            return false;
        }
        self.remote.insert(
            identity.to_string(),
            Participant {
                identity: identity.to_string(),
                name: UNANNOUNCED_NAME.to_string(),
                role: Role::Viewer,
                joined_at: SystemTime::now(),
            },
        );
        true
    }

    /// The transport saw a peer leave or its connection drop.
    pub fn peer_disconnected(&mut self, identity: &str) -> bool {
        self.connected.remove(identity);
        self.remote.remove(identity).is_some()
    }

    /// A `user_joined` announcement: add the peer or enrich its placeholder
    /// entry with the announced name and role.
    pub fn announce(&mut self, identity: &str, name: &str, role: Role) -> bool {
        if identity == self.local.identity {
            return false;
        }
        // The message itself proves the peer is present, even if the
        // transport's join event was missed or has not arrived yet.
        self.connected.insert(identity.to_string());
        match self.remote.get_mut(identity) {
            Some(existing) if existing.name == name && existing.role == role => false,
            Some(existing) => {
                existing.name = name.to_string();
                existing.role = role;
                true
            }
            None => {
                self.remote.insert(
                    identity.to_string(),
                    Participant {
                        identity: identity.to_string(),
                        name: name.to_string(),
                        role,
                        joined_at: SystemTime::now(),
                    },
                );
                true
            }
        }
    }

    /// A `user_left` announcement.
    pub fn depart(&mut self, identity: &str) -> bool {
        self.connected.remove(identity);
        self.remote.remove(identity).is_some()
    }

    /// Rebuild against the transport's current peer list: drop remote
    /// entries whose transport connection is gone.
    pub fn refresh(&mut self) -> bool {
        let before = self.remote.len();
        self.remote.retain(|identity, _| self.connected.contains(identity));
        self.remote.len() != before
    }

    pub fn role_of(&self, identity: &str) -> Option<Role> {
        if identity == self.local.identity {
            return Some(self.local.role);
        }
        self.remote.get(identity).map(|p| p.role)
    }

    /// Full snapshot: the local participant first, then hosts, then the rest
    /// by display name.
    pub fn snapshot(&self) -> Vec<Participant> {
        let mut rest: Vec<Participant> = self.remote.values().cloned().collect();
        rest.sort_by(|a, b| {
            match (a.role.is_host(), b.role.is_host()) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => a
                    .name
                    .to_lowercase()
                    .cmp(&b.name.to_lowercase())
                    .then_with(|| a.identity.cmp(&b.identity)),
            }
        });

        let mut out = Vec::with_capacity(rest.len() + 1);
        out.push(self.local.clone());
        out.extend(rest);
        out
    }

    pub fn len(&self) -> usize {
        self.remote.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Roster {
        Roster::new("me", "Alice", Role::Host)
    }

    #[test]
    fn local_participant_is_always_present() {
        let mut roster = roster();
        assert_eq!(roster.snapshot()[0].identity, "me");

        roster.peer_connected("p1");
        roster.peer_disconnected("p1");
        roster.depart("me");
        roster.refresh();

        let snapshot = roster.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].identity, "me");
        assert_eq!(snapshot[0].role, Role::Host);
    }

    #[test]
    fn join_and_leave_affect_exactly_one_identity() {
        let mut roster = roster();
        assert!(roster.peer_connected("p1"));
        assert!(roster.peer_connected("p2"));
        assert_eq!(roster.len(), 3);

        assert!(roster.peer_disconnected("p1"));
        let identities: Vec<_> = roster.snapshot().into_iter().map(|p| p.identity).collect();
        assert_eq!(identities, vec!["me", "p2"]);
    }

    #[test]
    fn announcement_enriches_placeholder() {
        let mut roster = roster();
        roster.peer_connected("p1");
        assert_eq!(roster.snapshot()[1].name, "?");

        assert!(roster.announce("p1", "Bob", Role::Viewer));
        let snapshot = roster.snapshot();
        assert_eq!(snapshot[1].name, "Bob");
        assert_eq!(snapshot[1].role, Role::Viewer);

        // Repeating the same announcement changes nothing.
        assert!(!roster.announce("p1", "Bob", Role::Viewer));
    }

    #[test]
    fn announcement_alone_adds_the_peer() {
        let mut roster = roster();
        assert!(roster.announce("p9", "Carol", Role::Host));
        assert_eq!(roster.role_of("p9"), Some(Role::Host));

        // A later refresh must not drop a peer we only know via messages.
        assert!(!roster.refresh());
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn refresh_prunes_disconnected_peers() {
        let mut roster = roster();
        roster.peer_connected("p1");
        roster.peer_connected("p2");
        // p1's connection drops without a user_left.
        roster.connected.remove("p1");

        assert!(roster.refresh());
        let identities: Vec<_> = roster.snapshot().into_iter().map(|p| p.identity).collect();
        assert_eq!(identities, vec!["me", "p2"]);
    }

    #[test]
    fn snapshot_orders_local_then_hosts_then_names() {
        let mut roster = Roster::new("me", "Alice", Role::Viewer);
        roster.announce("p1", "zoe", Role::Viewer);
        roster.announce("p2", "Hank", Role::Host);
        roster.announce("p3", "bob", Role::Viewer);

        let names: Vec<_> = roster.snapshot().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Alice", "Hank", "bob", "zoe"]);
    }

    #[test]
    fn self_events_are_ignored() {
        let mut roster = roster();
        assert!(!roster.peer_connected("me"));
        assert!(!roster.announce("me", "Impostor", Role::Viewer));
        assert_eq!(roster.snapshot()[0].name, "Alice");
    }
}
