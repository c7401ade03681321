//! Command Arguments
//!
//! Parameters go on the wire as raw bytes. [`ToArg`] converts the usual
//! key/value/number types into [`Bytes`], and [`args!`](crate::args) builds a
//! mixed parameter list in one go.

use bytes::Bytes;

/// Conversion of a single command parameter into its wire bytes.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

macro_rules! impl_to_arg_display {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

impl_to_arg_display!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// Builds a `Vec<Bytes>` parameter list from values of mixed types.
///
/// # Example
///
/// ```
/// use ssdb_client::args;
///
/// let params = args!["session", "token", 3600];
/// assert_eq!(params.len(), 3);
/// assert_eq!(&params[2][..], b"3600");
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Bytes>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::commands::ToArg::to_arg(&$arg)),+]
    };
}
