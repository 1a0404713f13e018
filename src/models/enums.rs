use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(WhenToTake {
    Morning => "Morning",
    Evening => "Evening",
    Both => "Both",
});

str_enum!(TimeOfDay {
    Morning => "Morning",
    Evening => "Evening",
});

impl WhenToTake {
    /// Case-insensitive parse for values coming back from a language model.
    /// Only the three scheduling buckets are recognised; anything else
    /// (including "Afternoon") is `None`.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Some(Self::Morning),
            "evening" => Some(Self::Evening),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn when_to_take_round_trips_through_str() {
        for v in [WhenToTake::Morning, WhenToTake::Evening, WhenToTake::Both] {
            assert_eq!(WhenToTake::from_str(v.as_str()).unwrap(), v);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = WhenToTake::from_str("Afternoon").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
        assert!(err.to_string().contains("WhenToTake"));
    }

    #[test]
    fn lenient_parse_ignores_case_and_whitespace() {
        assert_eq!(WhenToTake::parse_lenient(" morning "), Some(WhenToTake::Morning));
        assert_eq!(WhenToTake::parse_lenient("BOTH"), Some(WhenToTake::Both));
        assert_eq!(WhenToTake::parse_lenient("Afternoon"), None);
        assert_eq!(WhenToTake::parse_lenient(""), None);
    }

    #[test]
    fn serde_uses_variant_names() {
        let json = serde_json::to_string(&WhenToTake::Evening).unwrap();
        assert_eq!(json, "\"Evening\"");
        let back: TimeOfDay = serde_json::from_str("\"Morning\"").unwrap();
        assert_eq!(back, TimeOfDay::Morning);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(TimeOfDay::Evening.to_string(), "Evening");
    }
}
