/// Progress events emitted while statistics are computed.
#[derive(Debug, Clone)]
pub enum Progress {
    /// Evaluation pass begins; `total_properties` properties need data.
    ComputeStart { total_properties: u64 },
    PropertyStart { name: String },
    PropertyFinish,
    ComputeFinish,
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards progress events to an optional callback; a reporter without a
/// callback is silent and free.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
