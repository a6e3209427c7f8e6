//! RADIUS attributes and the attribute type dictionary

mod attribute;
mod types;

pub use attribute::{Attribute, VendorAttribute};
pub use types::AttributeType;
