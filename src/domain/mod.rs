//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod branch;
pub mod cache;
pub mod deferred;
pub mod directive;
pub mod error;
pub mod map;
pub mod record;
pub mod template;

pub use branch::{Branch, BranchFrame};
pub use cache::Cache;
pub use deferred::{take_after, DeferredEntry, DeferredQueue};
pub use directive::{DirectiveKind, DirectiveMatch, LeadingSplit, Pragma};
pub use error::{BoxError, DomainError, DomainResult};
pub use map::{DependencyMap, MapNode};
pub use record::{FileRecord, RebuiltFile};
pub use template::{DirectiveTemplate, TemplateEngine, TemplateScope};
