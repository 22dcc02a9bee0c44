use crate::replica::ServingStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// An immutable view of every replica's last known serving status.
#[derive(Clone, Debug, Default)]
pub(crate) struct HealthSnapshot {
    states: Arc<HashMap<String, ServingStatus>>,
}

impl HealthSnapshot {
    /// Addresses we have never heard about read as `Unknown`.
    pub(crate) fn status(&self, address: &str) -> ServingStatus {
        self.states.get(address).copied().unwrap_or(ServingStatus::Unknown)
    }

    pub(crate) fn is_serving(&self, address: &str) -> bool {
        self.status(address) == ServingStatus::Serving
    }

    pub(crate) fn to_map(&self) -> HashMap<String, ServingStatus> {
        self.states.as_ref().clone()
    }
}

#[cfg(test)]
impl HealthSnapshot {
    pub(crate) fn from_pairs(pairs: &[(&str, ServingStatus)]) -> Self {
        let states = pairs.iter().map(|(a, s)| (a.to_string(), *s)).collect();
        HealthSnapshot {
            states: Arc::new(states),
        }
    }
}

/// Creates the health table with every address starting out `Unknown`. There is exactly one
/// writer; any number of readers can be cloned from the returned view.
pub(crate) fn health_table<'a, I>(addresses: I) -> (HealthWriter, HealthView)
where
    I: IntoIterator<Item = &'a str>,
{
    let states = addresses
        .into_iter()
        .map(|address| (address.to_string(), ServingStatus::Unknown))
        .collect();
    let (sender, receiver) = watch::channel(HealthSnapshot {
        states: Arc::new(states),
    });

    (HealthWriter { sender }, HealthView { receiver })
}

pub(crate) struct HealthWriter {
    sender: watch::Sender<HealthSnapshot>,
}

impl HealthWriter {
    /// Records `status` for `address`. Publishes a new snapshot and returns the previous status
    /// only if the status actually changed.
    pub(crate) fn record(&self, address: &str, status: ServingStatus) -> Option<ServingStatus> {
        let current = self.sender.borrow().clone();
        let previous = current.status(address);
        if previous == status && current.states.contains_key(address) {
            return None;
        }

        let mut states = current.to_map();
        states.insert(address.to_string(), status);
        self.sender.send_replace(HealthSnapshot {
            states: Arc::new(states),
        });

        Some(previous)
    }
}

#[derive(Clone)]
pub(crate) struct HealthView {
    receiver: watch::Receiver<HealthSnapshot>,
}

impl HealthView {
    /// Never waits on a probe. Returns whatever the probe loop published last.
    pub(crate) fn snapshot(&self) -> HealthSnapshot {
        self.receiver.borrow().clone()
    }
}
