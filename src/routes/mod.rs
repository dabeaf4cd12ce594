/*!
 * Routes Module
 *
 * Configures the webhook surface used by the voice agent.
 */

pub mod webhooks;

pub use webhooks::create_webhook_routes;
