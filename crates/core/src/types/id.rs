//! Integer identifiers for baskets, owners and menu items.
//!
//! Each entity gets its own wrapper so a `UserId` can never be passed where a
//! `MenuItemId` is expected. All of them serialize as bare JSON numbers, which
//! is how the catalog and stored snapshots carry them.

/// Declare an `i32`-backed identifier type.
///
/// The generated type is `Copy`, totally ordered (grouped basket lines sort by
/// it), prints as its number and converts to and from `i32`.
///
/// ```rust
/// # use cmsg_core::define_id;
/// define_id!(TableId);
///
/// let table = TableId::from(12);
/// assert_eq!(table.to_string(), "12");
/// assert_eq!(i32::from(table), table.as_i32());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// The raw number.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(BasketId);
define_id!(UserId);
define_id!(MenuItemId);
