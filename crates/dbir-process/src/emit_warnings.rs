use crate::message::ProcessMessage;
use async_fn_stream::TryStreamEmitter;

/// Turns category failures into stream warnings so one broken category does
/// not abort the remaining ones.
pub(crate) struct WarningEmitter<'a> {
    emitter: &'a TryStreamEmitter<ProcessMessage, anyhow::Error>,
}

impl<'a> WarningEmitter<'a> {
    pub(crate) fn new(emitter: &'a TryStreamEmitter<ProcessMessage, anyhow::Error>) -> Self {
        Self { emitter }
    }

    pub(crate) async fn warn_category(&self, category: &str, error: anyhow::Error) {
        let error = error.context(format!("Evaluating category {category} failed"));
        self.emitter.emit(ProcessMessage::Warning { error }).await;
    }
}
