/// Declares a closed enumeration persisted by a stable string code.
///
/// Generates `ALL`, `as_str`, `Display`, `FromStr` and serde support that
/// round-trips through the code rather than the Rust variant name.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $code:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),*
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),* ];

            /// Stable persisted code
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $code ),*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::ProcessError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $code => Ok($name::$variant), )*
                    other => Err($crate::ProcessError::SerializationError(format!(
                        "unknown {} code: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::ProcessError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.as_str()
            }
        }
    };
}

/// Process aggregate and its identifiers
pub mod process;

/// Process steps and their status state machine
pub mod process_step;

/// Closed catalog of step types
pub mod step_type;

/// Application checklist entries and status derivation
pub mod checklist;

/// Audit records
pub mod audit;

/// Store interface and atomic change sets
pub mod repository;
