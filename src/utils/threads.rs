use std::thread;

/// Spawns an OS thread with a diagnostic name, matching every background
/// loop this engine runs (supervisor driver, health checker, log
/// redirector) so stack traces and `ps -T` output are self-describing.
pub fn spawn_named_thread<F, T, S>(name: S, f: F) -> thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
    S: ToString,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .expect("thread config should be valid")
}
