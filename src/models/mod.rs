mod booking;
mod discount_code;
mod mail;
mod payment;
mod reservation;
mod seller;
mod watchdog_job;

pub use booking::*;
pub use discount_code::*;
pub use mail::*;
pub use payment::*;
pub use reservation::*;
pub use seller::*;
pub use watchdog_job::*;
