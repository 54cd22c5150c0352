//! Application layer: the services that orchestrate the domain over the
//! ports. `WalletService` finances, `OrderService` places and walks orders
//! through their lifecycle, `DispatchEngine` broadcasts and awards them.

pub mod dispatch;
pub mod orders;
pub mod wallet;
