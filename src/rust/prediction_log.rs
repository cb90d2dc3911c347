use std::sync::Mutex;

use serde::Serialize;

/// One served `/predict` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredictionLogEntry {
    pub customer_name: String,
    pub predicted_product: String,
    pub predicted_quantity: i64,
}

/// Append-only record of served predictions.
///
/// Implementations must keep entries in append order and tolerate
/// concurrent appends.
pub trait PredictionLog: Send + Sync {
    fn append(&self, entry: PredictionLogEntry);
    fn entries(&self) -> Vec<PredictionLogEntry>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime log kept in memory
#[derive(Debug, Default)]
pub struct InMemoryPredictionLog {
    entries: Mutex<Vec<PredictionLogEntry>>,
}

impl InMemoryPredictionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PredictionLogEntry>> {
        // Appends are single pushes, so a poisoned list is never half-written
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PredictionLog for InMemoryPredictionLog {
    fn append(&self, entry: PredictionLogEntry) {
        self.lock().push(entry);
    }

    fn entries(&self) -> Vec<PredictionLogEntry> {
        self.lock().clone()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn entry(customer: &str, quantity: i64) -> PredictionLogEntry {
        PredictionLogEntry {
            customer_name: customer.to_string(),
            predicted_product: "Light Roast Sumatra".to_string(),
            predicted_quantity: quantity,
        }
    }

    #[test]
    fn test_entries_in_append_order() {
        let log = InMemoryPredictionLog::new();
        assert!(log.is_empty());
        log.append(entry("a", 1));
        log.append(entry("b", 2));
        log.append(entry("c", 3));

        let names: Vec<_> = log.entries().into_iter().map(|e| e.customer_name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let log = Arc::new(InMemoryPredictionLog::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..100 {
                        log.append(entry(&format!("{}-{}", t, i), i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 800);
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(entry("Béatrice Ben Salah", 4)).unwrap();
        assert_eq!(json["CustomerName"], "Béatrice Ben Salah");
        assert_eq!(json["PredictedProduct"], "Light Roast Sumatra");
        assert_eq!(json["PredictedQuantity"], 4);
    }
}
