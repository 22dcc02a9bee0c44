use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Creates a linked pair. The signal resolves once the handle is dropped (or fired).
pub fn shutdown_signal() -> (RoutingServerShutdownHandle, RoutingServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (
        RoutingServerShutdownHandle { tx: Some(tx) },
        RoutingServerShutdownSignal { rx },
    )
}

pub struct RoutingServerShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl RoutingServerShutdownHandle {
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

pub struct RoutingServerShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for RoutingServerShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = Pin::new(&mut self.rx);

        match rx.poll(cx) {
            Poll::Pending => Poll::Pending,
            // We don't care if oneshot Sender sent value or dropped
            Poll::Ready(_) => Poll::Ready(()),
        }
    }
}
