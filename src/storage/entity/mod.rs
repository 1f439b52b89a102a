pub mod price;

pub use price::Entity as Price;
