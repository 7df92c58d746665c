//! A metadata-driven ASN.1 runtime.
//!
//! Every runtime [`Value`] carries a pointer to an immutable
//! [`Descriptor`] describing its tag, constraints, field layout and
//! extension markers; the codecs traverse that metadata through a pair
//! of visitor traits to produce or consume their wire form. Three rule
//! sets are provided: BER (X.690), aligned PER (X.691) and ASN.1 value
//! notation (X.680 §A).
//!
//! ```
//! use asn1rt::env::{CoderEnv, EncodingRule};
//! use asn1rt::types::descriptor;
//!
//! let mut value = descriptor::INTEGER.new_value();
//! value.set_integer(5020);
//!
//! let env = CoderEnv::new(EncodingRule::Ber);
//! let mut wire = Vec::new();
//! env.encode(&value, &mut wire).unwrap();
//! assert_eq!([0x02, 0x02, 0x13, 0x9C], *wire);
//!
//! let mut shell = descriptor::INTEGER.new_value();
//! env.decode(&wire, &mut shell, false).unwrap();
//! assert_eq!(value, shell);
//! ```

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod avn;
pub mod ber;
pub mod bits;
pub mod env;
pub mod per;
pub mod tag;
pub mod types;
pub mod validator;
pub mod visit;

pub use env::{CoderEnv, DecodeError, EncodeError, EncodingRule, Module};
pub use tag::Tag;
pub use types::{Descriptor, Value};
pub use visit::{ConstVisitor, SeqStep, Visitor};

pub mod prelude {
    //! The commonly needed names in one import.
    pub use crate::env::{CoderEnv, EncodingRule, Module};
    pub use crate::tag::Tag;
    pub use crate::types::constraints::{Constraint, ConstraintKind};
    pub use crate::types::descriptor::{
        self, ChoiceInfo, Descriptor, Field, Kind, NamedNumber, SequenceInfo, TagMode,
    };
    pub use crate::types::{GeneralizedTime, Value};
    pub use crate::visit::{ConstVisitor, SeqStep, Visitor};
}
