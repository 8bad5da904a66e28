//! A JSON-index dataset in the CO3D layout: per-category gzipped annotation
//! lists, subset set-lists, and a fixed eval-batch index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};

use dbir_render::camera::Camera;
use serde::de::DeserializeOwned;

use crate::DatasetError;
use crate::annotation::{FrameAnnotation, SequenceAnnotation};
use crate::config::{JsonIndexConfig, Task};
use crate::frame_data::{FrameData, FrameType, FrameView, ImageBuffers, decode_depth, decode_mask, decode_rgb};
use crate::ply_import;

/// A frame is identified by its sequence and frame number.
pub type FrameId = (String, i64);

/// Set-list and eval-batch entries: sequence name, frame number, image path.
pub type SetListEntry = (String, i64, String);

#[derive(Debug)]
pub struct FrameEntry {
    pub annotation: FrameAnnotation,
    pub frame_type: FrameType,
}

#[derive(Debug)]
pub struct JsonIndexDataset {
    config: JsonIndexConfig,
    frames: BTreeMap<FrameId, FrameEntry>,
    sequences: BTreeMap<String, SequenceAnnotation>,
    eval_batches: Vec<Vec<FrameId>>,
}

impl JsonIndexDataset {
    /// Load the index files for one category from the dataset root.
    pub async fn load(config: &JsonIndexConfig, task: Task) -> Result<Self, DatasetError> {
        let category_dir = Path::new(&config.dataset_root).join(&config.category);
        log::info!(
            "Loading {} index for category {} from {}",
            task,
            config.category,
            category_dir.display()
        );

        let frames = read_index_json(&category_dir, "frame_annotations").await?;
        let sequences = read_index_json(&category_dir, "sequence_annotations").await?;
        let set_lists =
            read_index_json(&category_dir, &format!("set_lists_{}", task.tag())).await?;
        let eval_batches =
            read_index_json(&category_dir, &format!("eval_batches_{}", task.tag())).await?;

        Self::from_annotations(config.clone(), task, frames, sequences, set_lists, eval_batches)
    }

    /// Build the index from already-parsed annotations.
    pub fn from_annotations(
        config: JsonIndexConfig,
        task: Task,
        frames: Vec<FrameAnnotation>,
        sequences: Vec<SequenceAnnotation>,
        set_lists: BTreeMap<String, Vec<SetListEntry>>,
        eval_batches: Vec<Vec<SetListEntry>>,
    ) -> Result<Self, DatasetError> {
        let mut frame_types = HashMap::new();
        for (subset, entries) in &set_lists {
            let Some(frame_type) = FrameType::from_subset(subset) else {
                log::warn!("Ignoring unknown set-list subset {subset}");
                continue;
            };
            for (sequence, frame_number, _path) in entries {
                frame_types.insert((sequence.clone(), *frame_number), frame_type);
            }
        }

        // Frames absent from every set list are not part of this task.
        let mut indexed = BTreeMap::new();
        for annotation in frames {
            let id = (annotation.sequence_name.clone(), annotation.frame_number);
            if let Some(&frame_type) = frame_types.get(&id) {
                indexed.insert(
                    id,
                    FrameEntry {
                        annotation,
                        frame_type,
                    },
                );
            }
        }

        let sequences = sequences
            .into_iter()
            .map(|s| (s.sequence_name.clone(), s))
            .collect();

        let mut dataset = Self {
            config,
            frames: indexed,
            sequences,
            eval_batches: vec![],
        };

        if dataset.config.test_restrict_sequence_id >= 0 {
            dataset.restrict_to_test_sequence(dataset.config.test_restrict_sequence_id)?;
        }
        if task == Task::SingleSequence {
            let count = dataset.test_sequence_names().len();
            if count != 1 {
                return Err(DatasetError::NotSingleSequence(count));
            }
        }

        // Batches whose target got restricted away are dropped entirely;
        // unindexed source entries are dropped from their batch.
        dataset.eval_batches = eval_batches
            .into_iter()
            .map(|batch| {
                batch
                    .into_iter()
                    .map(|(sequence, frame_number, _path)| (sequence, frame_number))
                    .collect::<Vec<FrameId>>()
            })
            .filter(|batch| {
                batch
                    .first()
                    .is_some_and(|id| dataset.frames.contains_key(id))
            })
            .map(|batch| {
                batch
                    .into_iter()
                    .filter(|id| dataset.frames.contains_key(id))
                    .collect()
            })
            .collect();

        log::info!(
            "Indexed {} frames, {} sequences, {} eval batches",
            dataset.frames.len(),
            dataset.sequences.len(),
            dataset.eval_batches.len()
        );
        Ok(dataset)
    }

    /// Keep only the nth test sequence (sorted by name).
    fn restrict_to_test_sequence(&mut self, id: i64) -> Result<(), DatasetError> {
        let names = self.test_sequence_names();
        let Some(keep) = names.get(id as usize).cloned() else {
            return Err(DatasetError::SequenceOutOfRange {
                id,
                count: names.len(),
            });
        };
        self.frames.retain(|(sequence, _), _| *sequence == keep);
        self.sequences.retain(|sequence, _| *sequence == keep);
        Ok(())
    }

    /// Sorted names of sequences with test frames.
    pub fn test_sequence_names(&self) -> Vec<String> {
        let names: BTreeSet<_> = self
            .frames
            .iter()
            .filter(|(_, entry)| !entry.frame_type.is_train())
            .map(|((sequence, _), _)| sequence.clone())
            .collect();
        names.into_iter().collect()
    }

    pub fn eval_batches(&self) -> &[Vec<FrameId>] {
        &self.eval_batches
    }

    pub fn frame(&self, id: &FrameId) -> Option<&FrameEntry> {
        self.frames.get(id)
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn sequence(&self, name: &str) -> Option<&SequenceAnnotation> {
        self.sequences.get(name)
    }

    /// Frame ids of a given subset, in index order.
    pub fn frame_ids_of_type(&self, frame_type: FrameType) -> Vec<FrameId> {
        self.frames
            .iter()
            .filter(|(_, entry)| entry.frame_type == frame_type)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Cameras of all known frames of a sequence. Needed to judge target
    /// viewpoint difficulty for the single-sequence task; cameras come from
    /// annotations alone so no pixel data is read.
    pub fn source_cameras(&self, sequence: &str) -> Vec<Camera> {
        self.frames
            .iter()
            .filter(|((seq, _), entry)| seq == sequence && entry.frame_type.is_known())
            .map(|(_, entry)| entry.annotation.camera())
            .collect()
    }

    /// Load and decode all image planes of one frame.
    pub async fn load_frame(&self, id: &FrameId) -> Result<FrameView, DatasetError> {
        let entry = self
            .frame(id)
            .ok_or_else(|| DatasetError::MissingFrame(id.0.clone(), id.1))?;
        let annotation = &entry.annotation;
        let root = Path::new(&self.config.dataset_root);

        let rgb_bytes = tokio::fs::read(root.join(&annotation.image.path)).await?;
        let (size, rgb) = decode_rgb(&rgb_bytes, self.config.max_resolution)?;

        let mut depth = None;
        let mut depth_mask = None;
        if let Some(depth_annotation) = &annotation.depth {
            let bytes = tokio::fs::read(root.join(&depth_annotation.path)).await?;
            depth = Some(decode_depth(
                &bytes,
                depth_annotation.scale_adjustment,
                size,
            )?);
            if let Some(mask_path) = &depth_annotation.mask_path {
                let bytes = tokio::fs::read(root.join(mask_path)).await?;
                depth_mask = Some(decode_mask(&bytes, size)?);
            }
        }

        let mut fg_probability = None;
        if let Some(mask_annotation) = &annotation.mask {
            let bytes = tokio::fs::read(root.join(&mask_annotation.path)).await?;
            fg_probability = Some(decode_mask(&bytes, size)?);
        }

        Ok(FrameView {
            sequence_name: id.0.clone(),
            frame_number: id.1,
            frame_type: entry.frame_type,
            camera: annotation.camera(),
            image: ImageBuffers {
                size,
                rgb,
                depth,
                depth_mask,
                fg_probability,
            },
        })
    }

    /// Load a collated eval batch: the target plus at most `max_sources`
    /// known source frames.
    pub async fn load_eval_batch(
        &self,
        batch: &[FrameId],
        max_sources: usize,
    ) -> Result<FrameData, DatasetError> {
        let Some((target_id, source_ids)) = batch.split_first() else {
            return Err(DatasetError::InvalidBatch("empty batch".to_owned()));
        };

        let mut views = vec![self.load_frame(target_id).await?];
        for id in source_ids.iter().take(max_sources) {
            views.push(self.load_frame(id).await?);
        }

        let mut point_cloud = None;
        if self.config.load_point_clouds
            && let Some(annotation) = self
                .sequence(&target_id.0)
                .and_then(|s| s.point_cloud.as_ref())
        {
            let path = Path::new(&self.config.dataset_root).join(&annotation.path);
            point_cloud = Some(ply_import::load_point_cloud(path).await?);
        }

        let data = FrameData::collate(views, point_cloud);
        data.validate_eval_layout()?;
        Ok(data)
    }
}

/// Read `<stem>.jgz` (gzip JSON) or `<stem>.json`, whichever exists.
async fn read_index_json<T: DeserializeOwned>(
    dir: &Path,
    stem: &str,
) -> Result<T, DatasetError> {
    let jgz: PathBuf = dir.join(format!("{stem}.jgz"));
    let json: PathBuf = dir.join(format!("{stem}.json"));

    let bytes = if tokio::fs::try_exists(&jgz).await.unwrap_or(false) {
        tokio::fs::read(&jgz).await?
    } else {
        tokio::fs::read(&json).await?
    };

    // Sniff the gzip magic rather than trusting the extension.
    let text = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        out
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ImageAnnotation, ViewpointAnnotation};

    fn frame(sequence: &str, number: i64) -> FrameAnnotation {
        FrameAnnotation {
            sequence_name: sequence.to_owned(),
            frame_number: number,
            frame_timestamp: 0.0,
            image: ImageAnnotation {
                path: format!("cat/{sequence}/images/frame{number:06}.jpg"),
                size: [10, 10],
            },
            depth: None,
            mask: None,
            viewpoint: ViewpointAnnotation {
                rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                translation: [0.0, 0.0, 1.0],
                focal_length: [1.0, 1.0],
                principal_point: [0.0, 0.0],
            },
        }
    }

    fn entry(sequence: &str, number: i64) -> SetListEntry {
        (sequence.to_owned(), number, String::new())
    }

    fn two_sequence_fixture() -> (
        Vec<FrameAnnotation>,
        Vec<SequenceAnnotation>,
        BTreeMap<String, Vec<SetListEntry>>,
        Vec<Vec<SetListEntry>>,
    ) {
        let frames = vec![
            frame("seq_a", 1),
            frame("seq_a", 2),
            frame("seq_b", 1),
            frame("seq_b", 2),
        ];
        let sequences = vec![
            SequenceAnnotation {
                sequence_name: "seq_a".to_owned(),
                category: "cat".to_owned(),
                point_cloud: None,
            },
            SequenceAnnotation {
                sequence_name: "seq_b".to_owned(),
                category: "cat".to_owned(),
                point_cloud: None,
            },
        ];
        let mut set_lists = BTreeMap::new();
        set_lists.insert(
            "test_known".to_owned(),
            vec![entry("seq_a", 2), entry("seq_b", 2)],
        );
        set_lists.insert(
            "test_unseen".to_owned(),
            vec![entry("seq_a", 1), entry("seq_b", 1)],
        );
        let eval_batches = vec![
            vec![entry("seq_a", 1), entry("seq_a", 2)],
            vec![entry("seq_b", 1), entry("seq_b", 2)],
        ];
        (frames, sequences, set_lists, eval_batches)
    }

    #[test]
    fn frames_take_types_from_set_lists() {
        let (frames, sequences, set_lists, eval_batches) = two_sequence_fixture();
        let dataset = JsonIndexDataset::from_annotations(
            JsonIndexConfig::default(),
            Task::MultiSequence,
            frames,
            sequences,
            set_lists,
            eval_batches,
        )
        .expect("valid fixture");

        assert_eq!(dataset.num_frames(), 4);
        let target = dataset
            .frame(&("seq_a".to_owned(), 1))
            .expect("frame indexed");
        assert_eq!(target.frame_type, FrameType::TestUnseen);
        assert_eq!(dataset.eval_batches().len(), 2);
        assert_eq!(dataset.test_sequence_names(), vec!["seq_a", "seq_b"]);
    }

    #[test]
    fn restricting_selects_the_nth_test_sequence() {
        let (frames, sequences, set_lists, eval_batches) = two_sequence_fixture();
        let config = JsonIndexConfig {
            test_restrict_sequence_id: 1,
            ..JsonIndexConfig::default()
        };
        let dataset = JsonIndexDataset::from_annotations(
            config,
            Task::SingleSequence,
            frames,
            sequences,
            set_lists,
            eval_batches,
        )
        .expect("valid fixture");

        assert_eq!(dataset.test_sequence_names(), vec!["seq_b"]);
        assert_eq!(dataset.num_frames(), 2);
        // Batches of the dropped sequence disappear with it.
        assert_eq!(dataset.eval_batches().len(), 1);
        assert_eq!(dataset.eval_batches()[0][0].0, "seq_b");
    }

    #[test]
    fn restriction_out_of_range_is_an_error() {
        let (frames, sequences, set_lists, eval_batches) = two_sequence_fixture();
        let config = JsonIndexConfig {
            test_restrict_sequence_id: 5,
            ..JsonIndexConfig::default()
        };
        let err = JsonIndexDataset::from_annotations(
            config,
            Task::SingleSequence,
            frames,
            sequences,
            set_lists,
            eval_batches,
        )
        .expect_err("id 5 cannot exist");
        assert!(
            matches!(err, DatasetError::SequenceOutOfRange { id: 5, count: 2 }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn single_sequence_task_requires_one_test_sequence() {
        let (frames, sequences, set_lists, eval_batches) = two_sequence_fixture();
        let err = JsonIndexDataset::from_annotations(
            JsonIndexConfig::default(),
            Task::SingleSequence,
            frames,
            sequences,
            set_lists,
            eval_batches,
        )
        .expect_err("two test sequences without restriction");
        assert!(
            matches!(err, DatasetError::NotSingleSequence(2)),
            "unexpected error: {err:?}"
        );
    }

    fn gzip(text: &str) -> Vec<u8> {
        use std::io::Write;
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(text.as_bytes()).expect("gzip write");
        encoder.finish().expect("gzip finish")
    }

    #[tokio::test]
    async fn index_json_reads_gzip_and_plain_files() {
        let dir = std::env::temp_dir().join(format!("co3d-index-json-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");

        let annotations = vec![frame("seq_a", 1), frame("seq_b", 2)];
        let text = serde_json::to_string(&annotations).expect("serializable annotations");

        std::fs::write(dir.join("compressed.jgz"), gzip(&text)).expect("write jgz");
        std::fs::write(dir.join("plain.json"), &text).expect("write json");
        // A stem with both files present: the gzipped one must win.
        std::fs::write(dir.join("both.jgz"), gzip(&text)).expect("write jgz");
        std::fs::write(dir.join("both.json"), "[]").expect("write decoy json");

        let from_gzip: Vec<FrameAnnotation> = read_index_json(&dir, "compressed")
            .await
            .expect("gzipped index loads");
        let from_plain: Vec<FrameAnnotation> = read_index_json(&dir, "plain")
            .await
            .expect("plain index loads");
        assert_eq!(from_gzip.len(), 2);
        assert_eq!(from_gzip[0].sequence_name, from_plain[0].sequence_name);
        assert_eq!(from_gzip[1].frame_number, from_plain[1].frame_number);

        let preferred: Vec<FrameAnnotation> = read_index_json(&dir, "both")
            .await
            .expect("index with both files loads");
        assert_eq!(preferred.len(), 2, "the .jgz file takes precedence");

        let missing: Result<Vec<FrameAnnotation>, _> = read_index_json(&dir, "absent").await;
        assert!(
            matches!(missing, Err(DatasetError::Io(_))),
            "a stem with neither file is an IO error"
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn source_cameras_cover_known_frames_only() {
        let (frames, sequences, set_lists, eval_batches) = two_sequence_fixture();
        let dataset = JsonIndexDataset::from_annotations(
            JsonIndexConfig::default(),
            Task::MultiSequence,
            frames,
            sequences,
            set_lists,
            eval_batches,
        )
        .expect("valid fixture");
        assert_eq!(dataset.source_cameras("seq_a").len(), 1);
    }
}
