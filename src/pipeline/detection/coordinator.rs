//! Detection run: schedule filter → locator → report.
//!
//! The locator is chosen once, from `DetectionConfig`, and the coordinator
//! never branches on strategy afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::pointer::{CoordinatePointer, LocateOutcome};
use super::schedule::{due_medicines, time_of_day};
use super::text_match::{distinct_names, TextMatcher};
use super::types::{
    DetectionConfig, DetectionReport, DetectionStrategy, Detections, ImageInput, OcrProvider,
    OcrResult, PointDetection, ReportStatus, VisionLocateProvider,
};
use super::DetectionError;
use crate::db::PrescriptionStore;

/// What a locator found for one batch of names.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorOutput {
    pub detections: Detections,
    /// Set when some lookups failed and the detections may be partial.
    pub diagnostic: Option<String>,
}

/// Capability shared by the on-device and cloud detection strategies.
pub trait MedicineLocator: Send + Sync {
    fn strategy(&self) -> DetectionStrategy;

    /// Locate every name in the image. Per-name failures are folded into
    /// the diagnostic; only cancellation aborts the batch.
    fn locate_all(
        &self,
        image: &ImageInput,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<LocatorOutput, DetectionError>;
}

fn empty_detections(strategy: DetectionStrategy) -> Detections {
    match strategy {
        DetectionStrategy::OnDeviceOcr => Detections::Boxes(Vec::new()),
        DetectionStrategy::CloudPoint => Detections::Points(Vec::new()),
    }
}

// ──────────────────────────────────────────────
// On-device OCR strategy
// ──────────────────────────────────────────────

pub struct OcrTextLocator {
    ocr: Arc<dyn OcrProvider>,
    matcher: TextMatcher,
}

impl OcrTextLocator {
    pub fn new(ocr: Arc<dyn OcrProvider>) -> Self {
        Self {
            ocr,
            matcher: TextMatcher::new(),
        }
    }
}

impl MedicineLocator for OcrTextLocator {
    fn strategy(&self) -> DetectionStrategy {
        DetectionStrategy::OnDeviceOcr
    }

    fn locate_all(
        &self,
        image: &ImageInput,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<LocatorOutput, DetectionError> {
        let layout = match self.ocr.extract_text_with_layout(image) {
            Ok(layout) => layout,
            Err(e) => {
                tracing::warn!(error = %e, "OCR failed, reporting no detections");
                return Ok(LocatorOutput {
                    detections: Detections::Boxes(Vec::new()),
                    diagnostic: Some(format!("Text recognition failed: {e}")),
                });
            }
        };

        if cancel.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }

        let found = self.matcher.detect_in_layout(&layout, names);
        tracing::debug!(
            blocks = layout.blocks.len(),
            found = found.len(),
            "OCR text matched"
        );
        Ok(LocatorOutput {
            detections: Detections::Boxes(found),
            diagnostic: None,
        })
    }
}

// ──────────────────────────────────────────────
// Cloud point-query strategy
// ──────────────────────────────────────────────

pub struct PointQueryLocator {
    pointer: CoordinatePointer,
}

impl PointQueryLocator {
    pub fn new(pointer: CoordinatePointer) -> Self {
        Self { pointer }
    }
}

impl MedicineLocator for PointQueryLocator {
    fn strategy(&self) -> DetectionStrategy {
        DetectionStrategy::CloudPoint
    }

    fn locate_all(
        &self,
        image: &ImageInput,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<LocatorOutput, DetectionError> {
        let unique = distinct_names(names);

        let mut points = Vec::new();
        let mut failed: Vec<&str> = Vec::new();

        // Sequential on purpose: every call is billed.
        for name in unique.iter().copied() {
            if cancel.is_cancelled() {
                tracing::info!(medicine = %name, "Point queries cancelled");
                return Err(DetectionError::Cancelled);
            }

            match self.pointer.locate(image, name) {
                LocateOutcome::Found(point) => points.push(PointDetection {
                    name: name.to_string(),
                    point,
                }),
                LocateOutcome::Rejected(_) | LocateOutcome::NotFound => {}
                LocateOutcome::Failed(e) => {
                    tracing::warn!(medicine = %name, error = %e, "Lookup failed, continuing");
                    failed.push(name);
                }
            }
        }

        let diagnostic = if failed.is_empty() {
            None
        } else {
            Some(format!(
                "Lookup failed for {} of {} medicines: {}",
                failed.len(),
                unique.len(),
                failed.join(", ")
            ))
        };

        Ok(LocatorOutput {
            detections: Detections::Points(points),
            diagnostic,
        })
    }
}

// ──────────────────────────────────────────────
// Coordinator
// ──────────────────────────────────────────────

pub struct DetectionCoordinator {
    store: Arc<dyn PrescriptionStore>,
    locator: Arc<dyn MedicineLocator>,
}

impl DetectionCoordinator {
    pub fn new(store: Arc<dyn PrescriptionStore>, locator: Arc<dyn MedicineLocator>) -> Self {
        Self { store, locator }
    }

    /// Build the locator named by `config.strategy`. The matching provider
    /// must be supplied.
    pub fn from_config(
        config: &DetectionConfig,
        store: Arc<dyn PrescriptionStore>,
        ocr: Option<Arc<dyn OcrProvider>>,
        vision: Option<Arc<dyn VisionLocateProvider>>,
    ) -> Result<Self, DetectionError> {
        let locator: Arc<dyn MedicineLocator> = match config.strategy {
            DetectionStrategy::OnDeviceOcr => {
                let ocr = ocr.ok_or_else(|| {
                    DetectionError::Config("on-device strategy needs an OCR provider".into())
                })?;
                Arc::new(OcrTextLocator::new(ocr))
            }
            DetectionStrategy::CloudPoint => {
                let vision = vision.ok_or_else(|| {
                    DetectionError::Config("cloud strategy needs a vision provider".into())
                })?;
                Arc::new(PointQueryLocator::new(CoordinatePointer::new(
                    vision,
                    config.verification,
                    &config.point_qualifier,
                )))
            }
        };

        tracing::info!(strategy = ?config.strategy, "Detection coordinator configured");
        Ok(Self::new(store, locator))
    }

    pub fn strategy(&self) -> DetectionStrategy {
        self.locator.strategy()
    }

    /// One detection run for `image` at wall-clock `hour`.
    ///
    /// No eligible medicines short-circuits before any provider call.
    /// Provider failures degrade to a partial report with a diagnostic;
    /// only store errors and cancellation are returned as errors.
    pub fn run(
        &self,
        image: &ImageInput,
        hour: u32,
        cancel: &CancellationToken,
    ) -> Result<DetectionReport, DetectionError> {
        let _span = tracing::info_span!("detection_run", hour, strategy = ?self.strategy()).entered();

        let records = self.store.get_all_records()?;
        let tod = time_of_day(hour);
        let eligible = due_medicines(&records, hour);

        if eligible.is_empty() {
            tracing::info!(time_of_day = %tod, "No eligible medicines, skipping lookup");
            return Ok(DetectionReport {
                time_of_day: tod,
                status: ReportStatus::NoEligibleMedicines,
                eligible_medicines: Vec::new(),
                detections: empty_detections(self.strategy()),
                diagnostic: None,
            });
        }

        if cancel.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }

        let names: Vec<String> = eligible.iter().map(|m| m.name.clone()).collect();
        let output = self.locator.locate_all(image, &names, cancel)?;

        tracing::info!(
            eligible = eligible.len(),
            detected = output.detections.len(),
            partial = output.diagnostic.is_some(),
            "Detection run complete"
        );

        Ok(DetectionReport {
            time_of_day: tod,
            status: ReportStatus::Completed,
            eligible_medicines: eligible,
            detections: output.detections,
            diagnostic: output.diagnostic,
        })
    }
}

// ──────────────────────────────────────────────
// MockOcrProvider (testing)
// ──────────────────────────────────────────────

/// OCR provider returning a fixed layout (or a fixed error). Counts calls.
pub struct MockOcrProvider {
    result: Result<OcrResult, String>,
    calls: AtomicUsize,
}

impl MockOcrProvider {
    pub fn new(layout: OcrResult) -> Self {
        Self {
            result: Ok(layout),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrProvider for MockOcrProvider {
    fn extract_text_with_layout(&self, _image: &ImageInput) -> Result<OcrResult, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(DetectionError::Ocr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseError, InMemoryPrescriptionStore};
    use crate::models::{Medicine, PrescriptionRecord, TimeOfDay, WhenToTake};
    use crate::pipeline::detection::pointer::{MockVisionLocator, VerificationPolicy};
    use crate::pipeline::detection::types::{
        DetectedMedicine, LookupOutcome, NormalizedBoundingBox, OcrBlock, OcrLine, Point,
    };

    fn image() -> ImageInput {
        ImageInput::new(vec![0u8; 8], 800, 600, "image/jpeg")
    }

    fn store() -> Arc<InMemoryPrescriptionStore> {
        Arc::new(InMemoryPrescriptionStore::with_records(vec![PrescriptionRecord::new(
            "rx.jpg",
            "",
            vec![
                Medicine::new("Paracetamol", WhenToTake::Morning, 1),
                Medicine::new("Ibuprofen", WhenToTake::Evening, 2),
            ],
            false,
        )]))
    }

    fn paracetamol_layout() -> OcrResult {
        let line = OcrLine {
            text: "Paracetamol 500mg".into(),
            bounding_box: Some(NormalizedBoundingBox::new(0.1, 0.1, 0.4, 0.2)),
            elements: vec![],
        };
        OcrResult {
            full_text: "Paracetamol 500mg".into(),
            blocks: vec![OcrBlock {
                text: "Paracetamol 500mg".into(),
                bounding_box: None,
                lines: vec![line],
            }],
        }
    }

    fn ocr_coordinator(ocr: Arc<MockOcrProvider>) -> DetectionCoordinator {
        let ocr: Arc<dyn OcrProvider> = ocr;
        DetectionCoordinator::from_config(&DetectionConfig::default(), store(), Some(ocr), None)
            .unwrap()
    }

    fn cloud_coordinator(mock: Arc<MockVisionLocator>, policy: VerificationPolicy) -> DetectionCoordinator {
        let config = DetectionConfig {
            strategy: DetectionStrategy::CloudPoint,
            verification: policy,
            ..DetectionConfig::default()
        };
        let vision: Arc<dyn VisionLocateProvider> = mock;
        DetectionCoordinator::from_config(&config, store(), None, Some(vision)).unwrap()
    }

    struct BrokenStore;

    impl PrescriptionStore for BrokenStore {
        fn get_all_records(&self) -> Result<Vec<PrescriptionRecord>, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        fn most_recent(&self) -> Result<Option<PrescriptionRecord>, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        fn save_record(&self, _record: &PrescriptionRecord) -> Result<(), DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        fn delete_record(&self, _id: &str) -> Result<(), DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        fn clear(&self) -> Result<(), DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
    }

    #[test]
    fn morning_run_detects_paracetamol_box() {
        let ocr = Arc::new(MockOcrProvider::new(paracetamol_layout()));
        let report = ocr_coordinator(ocr.clone())
            .run(&image(), 9, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.time_of_day, TimeOfDay::Morning);
        assert_eq!(report.status, ReportStatus::Completed);
        let eligible: Vec<&str> = report.eligible_medicines.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(eligible, vec!["Paracetamol"]);
        assert_eq!(
            report.detections,
            Detections::Boxes(vec![DetectedMedicine {
                name: "Paracetamol".into(),
                matched_text: "Paracetamol 500mg".into(),
                bounding_box: NormalizedBoundingBox::new(0.1, 0.1, 0.4, 0.2),
            }])
        );
        assert!(report.diagnostic.is_none());
        assert_eq!(ocr.call_count(), 1);
    }

    #[test]
    fn evening_run_with_no_match_is_empty_not_error() {
        let ocr = Arc::new(MockOcrProvider::new(paracetamol_layout()));
        let report = ocr_coordinator(ocr).run(&image(), 20, &CancellationToken::new()).unwrap();

        assert_eq!(report.time_of_day, TimeOfDay::Evening);
        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.eligible_medicines[0].name, "Ibuprofen");
        assert!(report.detections.is_empty());
        assert!(report.diagnostic.is_none());
    }

    #[test]
    fn no_eligible_medicines_skips_provider() {
        let ocr = Arc::new(MockOcrProvider::new(paracetamol_layout()));
        let empty = Arc::new(InMemoryPrescriptionStore::new());
        let coordinator = DetectionCoordinator::new(empty, Arc::new(OcrTextLocator::new(ocr.clone())));

        let report = coordinator.run(&image(), 9, &CancellationToken::new()).unwrap();
        assert_eq!(report.status, ReportStatus::NoEligibleMedicines);
        assert!(report.eligible_medicines.is_empty());
        assert_eq!(ocr.call_count(), 0);
    }

    #[test]
    fn ocr_failure_degrades_to_diagnostic() {
        let ocr = Arc::new(MockOcrProvider::failing("engine unavailable"));
        let report = ocr_coordinator(ocr).run(&image(), 9, &CancellationToken::new()).unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.detections.is_empty());
        assert!(report.diagnostic.unwrap().contains("engine unavailable"));
    }

    #[test]
    fn store_failure_is_an_error() {
        let ocr: Arc<dyn OcrProvider> = Arc::new(MockOcrProvider::new(OcrResult::default()));
        let coordinator = DetectionCoordinator::new(Arc::new(BrokenStore), Arc::new(OcrTextLocator::new(ocr)));
        let err = coordinator.run(&image(), 9, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, DetectionError::Store(DatabaseError::LockPoisoned)));
    }

    #[test]
    fn cancelled_token_aborts_before_lookup() {
        let ocr = Arc::new(MockOcrProvider::new(paracetamol_layout()));
        let token = CancellationToken::new();
        token.cancel();
        let err = ocr_coordinator(ocr.clone()).run(&image(), 9, &token).unwrap_err();
        assert!(matches!(err, DetectionError::Cancelled));
        assert_eq!(ocr.call_count(), 0);
    }

    #[test]
    fn missing_provider_is_config_error() {
        let err = DetectionCoordinator::from_config(&DetectionConfig::default(), store(), None, None)
            .err()
            .unwrap();
        assert!(matches!(err, DetectionError::Config(_)));

        let cloud = DetectionConfig {
            strategy: DetectionStrategy::CloudPoint,
            ..DetectionConfig::default()
        };
        let ocr: Arc<dyn OcrProvider> = Arc::new(MockOcrProvider::new(OcrResult::default()));
        assert!(DetectionCoordinator::from_config(&cloud, store(), Some(ocr), None).is_err());
    }

    #[test]
    fn cloud_run_reports_points() {
        let mock = Arc::new(
            MockVisionLocator::new()
                .with_point_reply(LookupOutcome::Success(vec![Point::new(0.3, 0.4)])),
        );
        let coordinator = cloud_coordinator(mock.clone(), VerificationPolicy::AcceptOnAmbiguous);
        assert_eq!(coordinator.strategy(), DetectionStrategy::CloudPoint);

        let report = coordinator.run(&image(), 8, &CancellationToken::new()).unwrap();
        assert_eq!(
            report.detections,
            Detections::Points(vec![PointDetection {
                name: "Paracetamol".into(),
                point: Point::new(0.3, 0.4),
            }])
        );
        // primary point + verification
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn one_failed_lookup_does_not_abort_batch() {
        let records = vec![PrescriptionRecord::new(
            "rx.jpg",
            "",
            vec![
                Medicine::new("Aspirin", WhenToTake::Both, 1),
                Medicine::new("Ibuprofen", WhenToTake::Both, 1),
            ],
            false,
        )];
        let mock = Arc::new(
            MockVisionLocator::new()
                .with_point_reply(LookupOutcome::TransportFailure("503".into()))
                .with_point_reply(LookupOutcome::ParseFailure("not json".into()))
                .with_point_reply(LookupOutcome::Success(vec![Point::new(0.7, 0.2)])),
        );
        let pointer = CoordinatePointer::new(mock.clone(), VerificationPolicy::Disabled, "medicine");
        let coordinator = DetectionCoordinator::new(
            Arc::new(InMemoryPrescriptionStore::with_records(records)),
            Arc::new(PointQueryLocator::new(pointer)),
        );

        let report = coordinator.run(&image(), 12, &CancellationToken::new()).unwrap();
        assert_eq!(report.detections.names(), vec!["Ibuprofen"]);
        let diag = report.diagnostic.unwrap();
        assert!(diag.contains("1 of 2"));
        assert!(diag.contains("Aspirin"));
    }

    #[test]
    fn duplicate_due_names_are_queried_once() {
        let records = vec![
            PrescriptionRecord::new("a.jpg", "", vec![Medicine::new("Aspirin", WhenToTake::Both, 1)], false),
            PrescriptionRecord::new("b.jpg", "", vec![Medicine::new("Aspirin", WhenToTake::Morning, 1)], false),
        ];
        let mock = Arc::new(MockVisionLocator::new());
        let pointer = CoordinatePointer::new(mock.clone(), VerificationPolicy::Disabled, "medicine");
        let coordinator = DetectionCoordinator::new(
            Arc::new(InMemoryPrescriptionStore::with_records(records)),
            Arc::new(PointQueryLocator::new(pointer)),
        );

        let report = coordinator.run(&image(), 9, &CancellationToken::new()).unwrap();
        assert_eq!(report.eligible_medicines.len(), 2);
        assert!(report.detections.is_empty());
        // primary + fallback for a single name
        assert_eq!(mock.calls(), vec!["point:Aspirin medicine", "point:Aspirin"]);
    }

    #[test]
    fn case_variant_names_are_billed_once() {
        let records = vec![
            PrescriptionRecord::new("a.jpg", "", vec![Medicine::new("Aspirin", WhenToTake::Both, 1)], false),
            PrescriptionRecord::new("b.jpg", "", vec![Medicine::new("ASPIRIN", WhenToTake::Morning, 1)], false),
        ];
        let mock = Arc::new(MockVisionLocator::new());
        let pointer = CoordinatePointer::new(mock.clone(), VerificationPolicy::Disabled, "medicine");
        let coordinator = DetectionCoordinator::new(
            Arc::new(InMemoryPrescriptionStore::with_records(records)),
            Arc::new(PointQueryLocator::new(pointer)),
        );

        let report = coordinator.run(&image(), 9, &CancellationToken::new()).unwrap();
        assert_eq!(report.eligible_medicines.len(), 2);
        assert_eq!(mock.calls(), vec!["point:Aspirin medicine", "point:Aspirin"]);
    }
}
