//! Key resolution.
//!
//! A wrapped operation takes its arguments as a tuple. By default the cache
//! key is the first element of that tuple, compared by value. Supply a
//! custom resolver to build keys from several arguments.

/// Argument tuples whose first element can serve as a cache key.
pub trait Arguments {
    /// Type of the first argument.
    type First;

    /// Return a copy of the first argument.
    fn first(&self) -> Self::First;
}

/// Operations without arguments share a single key.
impl Arguments for () {
    type First = ();

    fn first(&self) -> Self::First {}
}

macro_rules! impl_arguments {
    ($first:ident $(, $rest:ident)*) => {
        impl<$first: Clone $(, $rest)*> Arguments for ($first, $($rest,)*) {
            type First = $first;

            fn first(&self) -> Self::First {
                self.0.clone()
            }
        }
    };
}

impl_arguments!(A1);
impl_arguments!(A1, A2);
impl_arguments!(A1, A2, A3);
impl_arguments!(A1, A2, A3, A4);
impl_arguments!(A1, A2, A3, A4, A5);
impl_arguments!(A1, A2, A3, A4, A5, A6);

/// The default key resolver: the first argument, verbatim.
pub fn first_argument<A: Arguments>(args: &A) -> A::First {
    args.first()
}
