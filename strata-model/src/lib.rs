//! strata Model - Classes, Instances and Polymorphic Dispatch
//!
//! Define classes with [`ClassBuilder`], bind them to a database context with
//! [`ModelAccess::model`], and work with instances through [`ModelHandle`] and
//! [`Model`].
//!
//! ```ignore
//! let schemas = SchemaRegistry::global();
//! let user = ClassBuilder::new("User")
//!     .field("username", FieldDescriptor::string().required())?
//!     .field("password", FieldDescriptor::string().restricted().rejected())?
//!     .build(schemas)?;
//!
//! let users = db.model(&user);
//! let mut bob = users.make(doc)?;
//! bob.save().await?;
//! ```

pub mod class;
pub mod handle;
pub mod instance;
pub mod persistence;

pub use class::{ClassBuilder, ComputedFn, ModelClass};
pub use handle::{ModelAccess, ModelHandle};
pub use instance::{Model, ModelState};
