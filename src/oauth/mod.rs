//! Popup-based OAuth2 sign-in.

pub mod coordinator;
mod flight;
pub mod popup;

pub use coordinator::{
    OAuthCoordinator, OAuthHandle, OAuthOutcome, OAuthTimings, MIN_POLL_INTERVAL,
};
pub use flight::{FlightPermit, SingleFlight};
pub use popup::{PopupOpener, PopupRequest, PopupWindow};
