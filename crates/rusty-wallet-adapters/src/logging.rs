/// Installs the global tracing subscriber.
///
/// Natively `RUST_LOG` is honoured on top of an INFO default; in the browser
/// events go to the devtools console.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

#[cfg(target_arch = "wasm32")]
pub fn init_tracing() {
    let _ = tracing_wasm::try_set_as_global_default();
}
