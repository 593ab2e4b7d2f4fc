pub mod gate;
pub mod on_subscribe;
pub mod on_subscribe_call;
pub mod on_subscribe_invoke;
pub mod run_subscription_on;

pub use gate::{Resolver, SubscribeHook, SubscriptionGate, SubscriptionState};
pub use on_subscribe::OnSubscribe;
pub use on_subscribe_call::OnSubscribeCall;
pub use on_subscribe_invoke::OnSubscribeInvoke;
pub use run_subscription_on::RunSubscriptionOn;
