//! Location subsystem for meetpoint.
//!
//! Provides the resolver contract, a Nominatim provider, a built-in offline
//! dataset, and the two-level lookup cache in front of them.

pub mod builtin;
pub mod cache;
pub mod providers;
pub mod resolver;
pub mod types;

pub use builtin::{builtin_city_list, BuiltinResolver, CityInfo};
pub use cache::{CacheSnapshot, LookupCache};
pub use providers::NominatimResolver;
pub use resolver::{CachingResolver, LookupSource, PlaceResolver, SharedCache};
pub use types::{PlaceInfo, ResolveError, ResolvedCity, ReverseTier, Settlement};
