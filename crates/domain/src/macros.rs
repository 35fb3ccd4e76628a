//! Macro for implementing Display and FromStr for status enums
//!
//! Stored and logged enum values use SCREAMING_SNAKE_CASE, so the macro
//! renders that form and parses it case-insensitively.
//!
//! # Example
//!
//! ```rust
//! use hubrelay_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum DeliveryStatus {
//!     Queued,
//!     Delivered,
//! }
//!
//! impl_domain_status_conversions!(DeliveryStatus {
//!     Queued => "QUEUED",
//!     Delivered => "DELIVERED",
//! });
//!
//! assert_eq!(DeliveryStatus::Queued.to_string(), "QUEUED");
//! assert_eq!("delivered".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Delivered));
//! ```

/// Implements Display and FromStr traits for status enums
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their upper-case string
///   representations
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
