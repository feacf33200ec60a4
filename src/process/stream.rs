/// One line of output captured from a supervised child's stdout/stderr.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    Stdout(String),
    Stderr(String),
}
