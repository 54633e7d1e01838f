use serde::{Deserialize, Serialize};

/// Charge level and charging flag of one battery. Levels are 0..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub level: u8,
    pub charging: bool,
}

/// Battery layout reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Battery {
    Single(BatteryStatus),
    Dual {
        left: BatteryStatus,
        right: BatteryStatus,
    },
}

impl Default for Battery {
    fn default() -> Self {
        Self::Single(BatteryStatus::default())
    }
}

impl Battery {
    /// Apply a level-only notification, keeping known charging flags.
    ///
    /// One byte is a single battery; two or more are left/right (any extra
    /// bytes are ignored).
    pub fn with_levels(self, levels: &[u8]) -> Self {
        match (self, levels) {
            (Self::Single(status), [level]) => Self::Single(BatteryStatus {
                level: *level,
                ..status
            }),
            (_, [level]) => Self::Single(BatteryStatus {
                level: *level,
                charging: false,
            }),
            (Self::Dual { left, right }, [l, r, ..]) => Self::Dual {
                left: BatteryStatus { level: *l, ..left },
                right: BatteryStatus { level: *r, ..right },
            },
            (_, [l, r, ..]) => Self::Dual {
                left: BatteryStatus {
                    level: *l,
                    charging: false,
                },
                right: BatteryStatus {
                    level: *r,
                    charging: false,
                },
            },
            (current, []) => current,
        }
    }
}

impl std::fmt::Display for Battery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_one = |s: &BatteryStatus| {
            format!("{}/5{}", s.level, if s.charging { " (charging)" } else { "" })
        };
        match self {
            Self::Single(s) => write!(f, "{}", fmt_one(s)),
            Self::Dual { left, right } => {
                write!(f, "L {} R {}", fmt_one(left), fmt_one(right))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_level_keeps_charging() {
        let battery = Battery::Single(BatteryStatus {
            level: 2,
            charging: true,
        });
        assert_eq!(
            battery.with_levels(&[4]),
            Battery::Single(BatteryStatus {
                level: 4,
                charging: true
            })
        );
    }

    #[test]
    fn test_dual_ignores_extra_bytes() {
        let battery = Battery::default().with_levels(&[4, 5, 1, 2]);
        match battery {
            Battery::Dual { left, right } => {
                assert_eq!(left.level, 4);
                assert_eq!(right.level, 5);
            }
            other => panic!("expected dual battery, got {:?}", other),
        }
    }
}
