//! Named broadcast groups.
//!
//! A [`Group`] is a [`Channel`]: sending to it enqueues a copy of the
//! message (sharing storage) to every subscriber. Subscriptions are
//! RAII values; dropping one unsubscribes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::actor::{ActorAddr, Channel};
use crate::message::Message;
use crate::message_id::MessageId;
use crate::resumable::ExecutionUnit;

struct GroupInner {
    name: String,
    members: RwLock<Vec<ActorAddr>>,
}

#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.inner.name)
            .field("members", &self.len())
            .finish()
    }
}

impl Group {
    fn new(name: String) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name,
                members: RwLock::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Add `member`. A second subscription for the same member does not
    /// duplicate deliveries.
    pub fn subscribe(&self, member: impl Into<ActorAddr>) -> Subscription {
        let member = member.into();
        {
            let mut members = self.inner.members.write();
            if !members.contains(&member) {
                members.push(member.clone());
            }
        }
        Subscription {
            group: self.clone(),
            member,
        }
    }

    pub fn unsubscribe(&self, member: &ActorAddr) {
        self.inner.members.write().retain(|m| m != member);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.members.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn same_as(&self, other: &Group) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Channel for Group {
    fn enqueue(
        &self,
        sender: &ActorAddr,
        mid: MessageId,
        msg: Message,
        host: Option<&Arc<dyn ExecutionUnit>>,
    ) {
        let members = self.inner.members.read().clone();
        for member in &members {
            member.enqueue(sender, mid, msg.clone(), host);
        }
    }
}

/// Membership in a group; unsubscribes on drop.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    group: Group,
    member: ActorAddr,
}

impl Subscription {
    #[must_use]
    pub fn group(&self) -> &Group {
        &self.group
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("group", &self.group.name())
            .field("member", &self.member)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.group.unsubscribe(&self.member);
    }
}

/// Hands out one [`Group`] per name.
#[derive(Debug, Default)]
pub struct GroupManager {
    groups: Mutex<HashMap<String, Group>>,
}

impl GroupManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The group called `name`, created on first use.
    pub fn get(&self, name: &str) -> Group {
        self.groups
            .lock()
            .entry(name.to_owned())
            .or_insert_with(|| Group::new(name.to_owned()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_returns_same_group_per_name() {
        let gm = GroupManager::new();
        let a = gm.get("news");
        let b = gm.get("news");
        let c = gm.get("sports");
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_eq!(a.name(), "news");
        assert!(a.is_empty());
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let gm = GroupManager::new();
        let g = gm.get("g");
        // The invalid address still counts as a member for bookkeeping.
        let sub = g.subscribe(ActorAddr::default());
        assert_eq!(g.len(), 1);
        assert!(sub.group().same_as(&g));
        drop(sub);
        assert!(g.is_empty());
    }
}
