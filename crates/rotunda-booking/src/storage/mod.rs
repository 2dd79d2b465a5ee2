pub mod compensation;
pub mod counters;
pub mod policies;
pub mod reservations;

pub use compensation::{CompensationQueue, InMemoryCompensationQueue};

pub use counters::{CounterStore, CounterUsage, InMemoryCounterStore};

pub use policies::{InMemoryPricingPolicyStore, PricingPolicyStore};

pub use reservations::{InMemoryReservationPricingStore, OverlapSelector, ReservationPricingStore};
