use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A cancellation flag shared between threads.
///
/// A child token is cancelled when it or any of its ancestors is. Cancelling a child
/// leaves its parent running.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flags: Vec<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            flags: vec![Arc::new(AtomicBool::new(false))],
        }
    }

    pub fn cancel(&self) {
        if let Some(own) = self.flags.last() {
            own.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn child(&self) -> CancellationToken {
        let mut flags = self.flags.clone();
        flags.push(Arc::new(AtomicBool::new(false)));
        CancellationToken { flags }
    }
}
