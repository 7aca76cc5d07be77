pub mod booking;
pub mod money;
pub mod payment;
pub mod principal;
pub mod space;

pub use booking::{Booking, BookingPatch, ConflictingBooking, BookingStatus, BookingWindow, NewBooking};
pub use money::Money;
pub use payment::{Payment, PaymentStatus};
pub use principal::{allows, AccountStatus, Action, Principal, Role};
pub use space::Space;
