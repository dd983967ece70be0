//! Page Components

mod checkout;
mod content;
mod home;
mod profile;
mod success;

pub use checkout::CheckoutPage;
pub use content::ContentPage;
pub use home::HomePage;
pub use profile::ProfilePage;
pub use success::SuccessPage;
