use once_cell::sync::OnceCell;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the `tracing` subscriber once per test binary. Integration tests
/// run as separate processes per file, so each file's first test pays this.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}
