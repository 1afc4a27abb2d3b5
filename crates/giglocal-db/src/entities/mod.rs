pub mod artist;
pub mod gig;
pub mod venue;
