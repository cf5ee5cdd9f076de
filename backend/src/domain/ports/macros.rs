//! Macro for declaring port error enums with snake_case constructors.
//!
//! ```ignore
//! define_port_error! {
//!     pub enum ExampleError {
//!         Connection { message: String } => "connection failed: {message}",
//!         Missing => "missing",
//!     }
//! }
//! let err = ExampleError::connection("refused");
//! ```

macro_rules! define_port_error {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        #[allow(dead_code, reason = "constructors are generated for every variant")]
        impl $name {
            $(
                ::paste::paste! {
                    #[doc = concat!("Construct [`", stringify!($name), "::", stringify!($variant), "`].")]
                    pub fn [<$variant:snake>]($( $($field: impl Into<$ty>),* )?) -> Self {
                        Self::$variant { $( $($field: $field.into()),* )? }
                    }
                }
            )*
        }
    };
}

pub(crate) use define_port_error;
