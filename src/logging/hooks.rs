//! Process-level hooks.
//!
//! A panic on the main thread takes the process down and is logged at FATAL.
//! A panic on any other thread (a Tokio worker running a task, for instance)
//! only ends that task, so it is logged at ERROR. In both cases the previous
//! hook runs afterwards, keeping the default panic output and behavior.

use std::any::Any;
use std::panic::{self, Location};
use std::thread;

use serde_json::json;

use crate::logging::{EventLogger, LogEvent, LogLevel};

pub const CONTEXT: &str = "PROCESS";

/// Route panics through `logger` before the previously installed hook.
pub fn install_panic_hook(logger: EventLogger) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        logger.log(panic_event(info.location(), info.payload()));
        logger.flush();
        previous(info);
    }));
}

fn panic_event(location: Option<&Location<'_>>, payload: &(dyn Any + Send)) -> LogEvent {
    let current = thread::current();
    let thread_name = current.name().unwrap_or("<unnamed>");
    let level = if thread_name == "main" {
        LogLevel::Fatal
    } else {
        LogLevel::Error
    };

    let location = location.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));

    LogEvent::new(level, "Unhandled panic")
        .with_context(CONTEXT)
        .with_data(json!({
            "thread": thread_name,
            "error": {
                "name": "panic",
                "message": panic_message(payload),
                "stack": location.into_iter().collect::<Vec<_>>(),
            },
        }))
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_thread_panic_is_error() {
        let handle = std::thread::Builder::new()
            .name("worker-1".into())
            .spawn(|| panic_event(None, &"boom"))
            .unwrap();
        let event = handle.join().unwrap();

        assert_eq!(event.level(), LogLevel::Error);
        assert_eq!(event.data().unwrap()["error"]["message"], "boom");
        assert_eq!(event.data().unwrap()["thread"], "worker-1");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");

        let boxed: Box<dyn Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(panic_message(boxed.as_ref()), "code 7");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
