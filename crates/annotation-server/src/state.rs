use frame_sampler::{
    ExtraFrameCache, LabelWriter, Preprocessor, SampleRateTable, Transcoder, VideoCatalog,
};
use shared::{Config, LabelSet, SharedStore, WorkspacePaths};
use std::sync::Arc;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheaply cloneable; every component shares the same store and transcoder.
#[derive(Clone)]
pub struct AppState {
    pub catalog: VideoCatalog,
    pub preprocessor: Preprocessor,
    pub extras: ExtraFrameCache,
    pub labels: LabelWriter,
    /// Label names offered to the editor
    pub label_set: Arc<LabelSet>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: SharedStore,
        paths: WorkspacePaths,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let sampling = SampleRateTable::from_config(&config.sampling);
        let catalog = VideoCatalog::new(
            store,
            paths,
            sampling,
            transcoder,
            config.videos.extensions.clone(),
        );
        let extras = ExtraFrameCache::new(catalog.clone(), config.preprocess.extras_cache_videos);

        Self {
            preprocessor: Preprocessor::new(catalog.clone(), extras.clone()),
            labels: LabelWriter::new(catalog.clone()),
            label_set: Arc::new(LabelSet::from_names(
                &config.labels.video,
                &config.labels.clip,
            )),
            catalog,
            extras,
        }
    }
}
