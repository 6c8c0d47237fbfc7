//! `Tessera` Core: entity collections, reactive cells, and the sort, filter,
//! selection, paging and call-status models the store composes.

pub mod call_status;
pub mod clock;
pub mod collection;
pub mod fetch;
pub mod filter;
pub mod id;
pub mod paging;
pub mod query_params;
pub mod reactive;
pub mod scroll;
pub mod selection;
pub mod snapshot;
pub mod sort;
pub mod state;

pub use call_status::{CallStatus, CallStatusError, LoadError};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use collection::EntityCollection;
pub use fetch::{FetchRequest, FetchResult, PageRequest};
pub use filter::{merge_patch, FilterInput, FilterRequest, FilterValue, PatchError};
pub use id::{Entity, EntityId, ParseEntityIdError};
pub use paging::{pages_count, Page, PageCache, PageInfo, PagedState};
pub use query_params::{QueryParamKeys, QueryParamsState};
pub use reactive::{Derived, Signal, Subscription};
pub use scroll::ScrollWindow;
pub use selection::{AllSelected, SelectionState};
pub use snapshot::{SnapshotFields, StorageSnapshot};
pub use sort::{Sort, SortDirection};
pub use state::{CollectionState, PagingState};
