pub mod positions;
pub mod ttl;

pub use positions::PositionCache;
pub use ttl::TtlCache;
