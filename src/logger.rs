use std::{
    any::Any,
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use once_cell::sync::Lazy;
use tracing::warn;

// Component names of the result records kept for export
pub const ALLAN_DEVIATION_LOG: &str = "ALLAN_DEVIATION";
pub const NOISE_PARAMETERS_LOG: &str = "NOISE_PARAMETERS";

#[derive(Debug, Clone)]
pub struct LogEntry<T> {
    pub timestamp: SystemTime,
    pub data: T,
}

pub struct Logger<T: Send + Clone + Debug + 'static> {
    data_storage: Mutex<Vec<LogEntry<T>>>,
}

impl<T: Send + Clone + Debug + 'static> Logger<T> {
    fn new() -> Self {
        Logger {
            data_storage: Mutex::new(Vec::new()),
        }
    }

    fn storage(&self) -> MutexGuard<'_, Vec<LogEntry<T>>> {
        self.data_storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, data: T) {
        self.storage().push(LogEntry {
            timestamp: SystemTime::now(),
            data,
        });
    }

    fn get_data(&self) -> Vec<LogEntry<T>> {
        self.storage().clone()
    }

    fn take_data(&self) -> Vec<LogEntry<T>> {
        std::mem::take(&mut *self.storage())
    }
}

type Registry = HashMap<String, Box<dyn Any + Send + Sync>>;

static LOGGERS: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, Registry> {
    LOGGERS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `None` when the component already logs records of another type.
fn get_or_create_logger<T: Send + Clone + Debug + Sync + 'static>(
    name: &str,
) -> Option<Arc<Logger<T>>> {
    let mut loggers = registry();

    match loggers.get(name) {
        Some(logger) => logger.downcast_ref::<Arc<Logger<T>>>().cloned(),
        None => {
            let new_logger = Arc::new(Logger::<T>::new());
            loggers.insert(name.to_string(), Box::new(new_logger.clone()));
            Some(new_logger)
        }
    }
}

fn get_logger<T: Send + Clone + Debug + Sync + 'static>(name: &str) -> Option<Arc<Logger<T>>> {
    registry()
        .get(name)
        .and_then(|logger| logger.downcast_ref::<Arc<Logger<T>>>())
        .cloned()
}

pub fn log<T: Send + Clone + Debug + Sync + 'static>(component_name: &str, data: T) {
    match get_or_create_logger::<T>(component_name) {
        Some(logger) => logger.log(data),
        None => warn!(
            component = component_name,
            record = ?data,
            "component logs records of another type, record dropped"
        ),
    }
}

pub fn get_data<T: Send + Clone + Debug + Sync + 'static>(
    component_name: &str,
) -> Option<Vec<LogEntry<T>>> {
    get_logger::<T>(component_name).map(|logger| logger.get_data())
}

/// Drains the records of a component, leaving its log empty.
pub fn take_data<T: Send + Clone + Debug + Sync + 'static>(
    component_name: &str,
) -> Option<Vec<LogEntry<T>>> {
    get_logger::<T>(component_name).map(|logger| logger.take_data())
}
