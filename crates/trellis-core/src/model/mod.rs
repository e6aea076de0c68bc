pub mod entity;
pub mod metadata;
pub mod value;

pub use entity::{EntityRef, EntityVersion};
pub use metadata::{
    AssociationEnd, Cardinality, Destructor, EntityMetadata, ModelMetadata, OnDeletePolicy,
};
pub use value::PropertyValue;
