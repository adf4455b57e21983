pub mod pending_reconciler;
