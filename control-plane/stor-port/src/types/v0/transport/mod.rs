pub mod apicall;
pub mod internal;
pub mod misc;
pub mod node;
pub mod pool;
pub mod resource;
pub mod select;

pub use apicall::*;
pub use internal::*;
pub use misc::*;
pub use node::*;
pub use pool::*;
pub use resource::*;
pub use select::*;

pub use crate::{rpc_impl_string_id, rpc_impl_string_id_inner};
