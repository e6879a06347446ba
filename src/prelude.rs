//! Prelude
//!
//! ```rust
//! use oic_sp::prelude::*;
//!
//! let resource = SpResource::new(SpConfig::default(), MemoryStore::new()).unwrap();
//! assert!(is_same(resource.profile(), &SecurityProfile::baseline(), None));
//! ```

pub use crate::cbor::DecodeError;
pub use crate::codec::{BufferLimits, DecodedProfile, SpCodec};
pub use crate::config::SpConfig;
pub use crate::error::SpError;
pub use crate::profile::{CredentialPolicy, PropertySet, SecurityProfile, SpProperty};
pub use crate::resource::{EntityHandlerResult, SpRequest, SpResource, SpResponse, UpdateStage};
pub use crate::store::{FileStore, MemoryStore, PersistentStore, StoreError};
pub use crate::validate::{is_same, is_valid, required_props_present_and_valid, ValidationError};
