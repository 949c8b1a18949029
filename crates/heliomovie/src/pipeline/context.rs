use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::compositor::FrameGeometry;
use crate::sequencer::SequenceOutcome;
use crate::storage::JobDirectory;
use crate::worker::job::MovieJob;

use super::error::PipelineWarning;

pub struct PipelineContext {
    // Input
    pub job: MovieJob,
    pub directory: JobDirectory,

    // Set by step_prepare
    pub geometry: Option<FrameGeometry>,

    // Set by step_composite
    pub sequence: Option<SequenceOutcome>,

    // Set by step_encode
    pub outputs: BTreeMap<String, PathBuf>,

    // Set by step_finalize
    pub thumbnail: Option<PathBuf>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job: MovieJob, directory: JobDirectory) -> Self {
        Self {
            job,
            directory,
            geometry: None,
            sequence: None,
            outputs: BTreeMap::new(),
            thumbnail: None,
            warnings: Vec::new(),
        }
    }
}
