pub mod booking;
pub mod calendar;
pub mod conflicts;
pub mod payments;
pub mod pricing;
pub mod rate_limit;
pub mod spaces;
pub mod sweep;
