pub mod period;
pub mod price;
pub mod quantity;
pub mod ticker;
