//! Security profile (`/oic/sec/sp`) resource
//!
//! - [`profile`]: the [`SecurityProfile`] model and [`PropertySet`] presence tracking
//! - [`codec`]: CBOR encode (with grow-and-retry) and order-independent decode
//! - [`validate`]: consistency rules and masked comparison
//! - [`resource`]: stored state, GET/POST handling and the update protocol
//! - [`store`]: persistence collaborators

pub mod cbor;
pub mod codec;
pub mod config;
pub mod error;
pub mod prelude;
pub mod profile;
pub mod query;
pub mod resource;
pub mod store;
pub mod validate;

pub use codec::{BufferLimits, DecodedProfile, SpCodec, CBOR_MAX_SIZE, CBOR_SIZE};
pub use config::SpConfig;
pub use error::SpError;
pub use profile::{
    profile_index, requires_credential, CredentialPolicy, PropertySet, SecurityProfile, SpProperty,
    BASELINE_PROFILE, BLACK_PROFILE, BLUE_PROFILE,
};
pub use resource::{EntityHandlerResult, SpRequest, SpResource, SpResponse, UpdateStage};
pub use store::{FileStore, MemoryStore, PersistentStore, StoreError};
pub use validate::{is_same, required_props_present_and_valid, ValidationError};
