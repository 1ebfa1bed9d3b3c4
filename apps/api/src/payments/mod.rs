// Payments: webhook trust boundary and entitlement state.
// Unverified bytes never reach the reconciler; `VerifiedBody` is only minted by a valid check.

pub mod checkout;
pub mod event;
pub mod handlers;
pub mod reconciler;
pub mod signature;
pub mod store;
