//! Drop-packet policy facade.
//!
//! Two policy sets exist, one per direction (ground-bound "to SIM",
//! SV-bound "to SV"), each holding an independent policy per payload type.
//! The router consults a set via [`DropPolicySet::apply`] and reconfigures
//! it through the config-change path; everything runs on the reactor worker
//! so no interior locking is needed.

/// Drop algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropAlgorithm {
    /// Never drop.
    #[default]
    Off,
    /// Drop every packet of the payload type.
    All,
    /// Drop every n-th packet of the payload type.
    Interval,
}

/// Configured policy for one payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyConfig {
    pub algorithm: DropAlgorithm,
    /// Interval for [`DropAlgorithm::Interval`]; ignored otherwise. An
    /// interval of 0 behaves like `Off`.
    pub interval: u32,
}

#[derive(Debug, Clone, Default)]
struct Policy {
    config: PolicyConfig,
    seen: u64,
}

impl Policy {
    fn apply(&mut self) -> bool {
        match self.config.algorithm {
            DropAlgorithm::Off => false,
            DropAlgorithm::All => true,
            DropAlgorithm::Interval => {
                if self.config.interval == 0 {
                    return false;
                }
                self.seen += 1;
                self.seen % u64::from(self.config.interval) == 0
            }
        }
    }
}

/// One direction's drop policies, indexed by payload type.
#[derive(Debug, Clone)]
pub struct DropPolicySet {
    policies: [Policy; 8],
    defaults: [PolicyConfig; 8],
}

impl DropPolicySet {
    /// Builds the set from its configured initial policies.
    #[must_use]
    pub fn new(defaults: [PolicyConfig; 8]) -> Self {
        let mut set = Self {
            policies: Default::default(),
            defaults,
        };
        set.change_config_to_default();
        set
    }

    /// Decides the fate of one packet: `true` means drop it.
    pub fn apply(&mut self, payload_type: u8) -> bool {
        self.policies[usize::from(payload_type & 0x07)].apply()
    }

    /// Replaces the policy for one payload type.
    pub fn change_config(&mut self, payload_type: u8, config: PolicyConfig) {
        let policy = &mut self.policies[usize::from(payload_type & 0x07)];
        policy.config = config;
        policy.seen = 0;
    }

    /// Restores every payload type to its configured initial policy.
    pub fn change_config_to_default(&mut self) {
        for (policy, default) in self.policies.iter_mut().zip(self.defaults) {
            policy.config = default;
            policy.seen = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_never_drops() {
        let mut set = DropPolicySet::new([PolicyConfig::default(); 8]);
        for _ in 0..100 {
            assert!(!set.apply(2));
        }
    }

    #[test]
    fn all_always_drops_only_its_payload_type() {
        let mut defaults = [PolicyConfig::default(); 8];
        defaults[4] = PolicyConfig {
            algorithm: DropAlgorithm::All,
            interval: 0,
        };
        let mut set = DropPolicySet::new(defaults);
        assert!(set.apply(4));
        assert!(set.apply(4));
        assert!(!set.apply(5));
    }

    #[test]
    fn interval_drops_every_nth() {
        let mut set = DropPolicySet::new([PolicyConfig::default(); 8]);
        set.change_config(
            2,
            PolicyConfig {
                algorithm: DropAlgorithm::Interval,
                interval: 3,
            },
        );
        let dropped: Vec<bool> = (0..6).map(|_| set.apply(2)).collect();
        assert_eq!(dropped, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn zero_interval_is_inert() {
        let mut set = DropPolicySet::new([PolicyConfig::default(); 8]);
        set.change_config(
            1,
            PolicyConfig {
                algorithm: DropAlgorithm::Interval,
                interval: 0,
            },
        );
        assert!(!set.apply(1));
    }

    #[test]
    fn default_restores_initial_policies() {
        let mut defaults = [PolicyConfig::default(); 8];
        defaults[0] = PolicyConfig {
            algorithm: DropAlgorithm::All,
            interval: 0,
        };
        let mut set = DropPolicySet::new(defaults);
        set.change_config(0, PolicyConfig::default());
        assert!(!set.apply(0));
        set.change_config_to_default();
        assert!(set.apply(0));
    }
}
