//! Consent gate.
//!
//! Progression past the consent stage requires every tracked item to be
//! accepted. Granting is one-way: once `accept()` succeeds the set is frozen.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// One named agreement toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsentItem {
    Policy,
    Terms,
    Emails,
    Cookies,
}

impl ConsentItem {
    pub const ALL: [ConsentItem; 4] = [
        ConsentItem::Policy,
        ConsentItem::Terms,
        ConsentItem::Emails,
        ConsentItem::Cookies,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ConsentItem::Policy => "policy",
            ConsentItem::Terms => "terms",
            ConsentItem::Emails => "emails",
            ConsentItem::Cookies => "cookies",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConsentItem::Policy => "Privacy policy",
            ConsentItem::Terms => "Terms of use",
            ConsentItem::Emails => "Receiving emails",
            ConsentItem::Cookies => "Accept cookies",
        }
    }
}

impl fmt::Display for ConsentItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ConsentItem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ConsentItem::ALL
            .into_iter()
            .find(|item| item.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown consent item '{}'", s))
    }
}

/// Acceptance flag per consent item. All flags start false.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsentSet {
    flags: BTreeMap<ConsentItem, bool>,
}

impl ConsentSet {
    pub fn new() -> Self {
        Self {
            flags: ConsentItem::ALL.iter().map(|item| (*item, false)).collect(),
        }
    }

    pub fn is_accepted(&self, item: ConsentItem) -> bool {
        self.flags.get(&item).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConsentItem, bool)> + '_ {
        self.flags.iter().map(|(item, flag)| (*item, *flag))
    }

    pub fn all_accepted(&self) -> bool {
        self.flags.values().all(|flag| *flag)
    }
}

impl Default for ConsentSet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConsentGate {
    set: ConsentSet,
    granted: bool,
}

impl ConsentGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one item. Ignored once consent has been granted.
    pub fn toggle(&mut self, item: ConsentItem) {
        if self.granted {
            log::debug!("consent already granted; ignoring toggle of {}", item);
            return;
        }
        if let Some(flag) = self.set.flags.get_mut(&item) {
            *flag = !*flag;
        }
    }

    pub fn set(&mut self, item: ConsentItem, accepted: bool) {
        if self.is_accepted(item) != accepted {
            self.toggle(item);
        }
    }

    pub fn is_accepted(&self, item: ConsentItem) -> bool {
        self.set.is_accepted(item)
    }

    pub fn is_complete(&self) -> bool {
        self.set.all_accepted()
    }

    /// One-way transition to granted. Returns whether consent is now granted;
    /// a no-op while any item is still unchecked.
    pub fn accept(&mut self) -> bool {
        if self.is_complete() {
            self.granted = true;
        }
        self.granted
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    pub fn items(&self) -> &ConsentSet {
        &self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_requires_every_flag() {
        // Walk every combination of the four flags.
        for mask in 0u8..16 {
            let mut gate = ConsentGate::new();
            for (bit, item) in ConsentItem::ALL.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    gate.toggle(*item);
                }
            }
            let granted = gate.accept();
            assert_eq!(granted, mask == 0b1111, "mask {:04b}", mask);
            assert_eq!(gate.is_granted(), mask == 0b1111);
        }
    }

    #[test]
    fn toggle_only_touches_one_item() {
        let mut gate = ConsentGate::new();
        gate.toggle(ConsentItem::Terms);
        assert!(gate.is_accepted(ConsentItem::Terms));
        assert!(!gate.is_accepted(ConsentItem::Policy));
        assert!(!gate.is_accepted(ConsentItem::Emails));
        assert!(!gate.is_accepted(ConsentItem::Cookies));

        gate.toggle(ConsentItem::Terms);
        assert!(!gate.is_accepted(ConsentItem::Terms));
    }

    #[test]
    fn granted_set_is_frozen() {
        let mut gate = ConsentGate::new();
        for item in ConsentItem::ALL {
            gate.set(item, true);
        }
        assert!(gate.accept());
        gate.toggle(ConsentItem::Cookies);
        assert!(gate.is_accepted(ConsentItem::Cookies));
        assert!(gate.is_complete());
    }

    #[test]
    fn parses_item_keys() -> Result<()> {
        assert_eq!("Cookies".parse::<ConsentItem>()?, ConsentItem::Cookies);
        assert!("newsletter".parse::<ConsentItem>().is_err());
        Ok(())
    }
}
