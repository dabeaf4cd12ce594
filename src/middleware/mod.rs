/*!
 * Middleware Module
 *
 * Contains HTTP middleware for webhook authentication and other
 * cross-cutting concerns.
 */

// Static API key authentication
pub mod api_key;

pub use api_key::api_key_auth_middleware;
