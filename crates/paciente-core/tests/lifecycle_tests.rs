//! Add-record flow against an on-disk store.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use paciente_classifier::{
    Classifier, ClassifierResult, FixedModel, ImageModel, PixelBuffer, PixelFormat, Prediction,
};
use paciente_core::db::{Database, PatientRepository};
use paciente_core::{CoreConfig, DraftPhase, RecordController, SaveOutcome, ValidationIssue};
use tokio::runtime::Handle;

/// Reports whatever it saw so tests can check the prepared buffer.
struct RecordingModel {
    seen: Mutex<Vec<(u32, u32, usize, PixelFormat)>>,
}

impl ImageModel for RecordingModel {
    fn predict(&self, input: &PixelBuffer) -> ClassifierResult<Prediction> {
        self.seen.lock().unwrap().push((
            input.width(),
            input.height(),
            input.bytes_per_row(),
            input.format(),
        ));
        Ok(Prediction::probabilities([
            ("abrasion", 0.2),
            ("laceration", 0.7),
            ("burn", 0.1),
        ]))
    }
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 60, 50])));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

fn controller(
    repository: Arc<dyn PatientRepository>,
    model: Arc<dyn ImageModel>,
) -> RecordController {
    RecordController::new(
        repository,
        Arc::new(Classifier::with_model(model)),
        CoreConfig::default(),
        Handle::current(),
    )
}

#[tokio::test]
async fn test_saved_patient_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patients.db");

    let saved = {
        let repo = Arc::new(Mutex::new(Database::open(&path).unwrap()));
        let mut controller = controller(repo, Arc::new(FixedModel::label("laceration")));
        controller.set_name("Ana");
        controller.set_age_text(" 29 ");
        controller.set_sex("F");
        controller.select_photo(jpeg(640, 480));

        match controller.save().await.unwrap() {
            SaveOutcome::Saved(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        }
    };

    let reopened = Database::open(&path).unwrap();
    let patients = reopened.list_patients().unwrap();
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0], saved);
    assert_eq!(patients[0].name, "Ana");
    assert_eq!(patients[0].age, 29);
    assert_eq!(patients[0].sex, "F");
    assert_eq!(patients[0].classification_label, "laceration");
    assert!(patients[0].has_photo());
}

#[tokio::test]
async fn test_model_sees_prepared_buffer_and_argmax_is_stored() {
    let repo = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let model = Arc::new(RecordingModel {
        seen: Mutex::new(Vec::new()),
    });
    let mut controller = controller(repo.clone(), model.clone());

    controller.set_name("Bruno");
    controller.set_age_text("41");
    controller.set_sex("M");
    controller.select_photo(jpeg(1000, 300));
    assert_eq!(controller.wait_for_classification().await, "laceration");

    let seen = model.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(224, 224, 896, PixelFormat::Xrgb8888)]);

    assert!(controller.save().await.unwrap().is_saved());
    assert_eq!(repo.list().unwrap()[0].classification_label, "laceration");
}

#[tokio::test]
async fn test_fields_in_any_order() {
    let repo = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let mut controller = controller(repo.clone(), Arc::new(FixedModel::label("burn")));

    controller.select_photo(jpeg(32, 32));
    assert_eq!(controller.state(), DraftPhase::PhotoAttached);
    controller.set_sex("F");
    controller.set_age_text("7");
    assert!(!controller.can_save());
    controller.set_name("Carla");
    assert!(controller.can_save());

    assert!(controller.save().await.unwrap().is_saved());
    assert_eq!(repo.list().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_photo_is_rejected() {
    let repo = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let mut controller = controller(repo.clone(), Arc::new(FixedModel::label("burn")));
    controller.set_name("Ana");
    controller.set_age_text("29");
    controller.set_sex("F");

    let outcome = controller.save().await.unwrap();
    assert_eq!(outcome, SaveOutcome::Rejected(ValidationIssue::MissingPhoto));
    assert!(repo.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_out_of_range_age_is_rejected() {
    let repo = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let mut controller = controller(repo.clone(), Arc::new(FixedModel::label("burn")));
    controller.set_name("Ana");
    controller.set_sex("F");
    controller.select_photo(jpeg(32, 32));

    for text in ["-1", "40000", "12.5"] {
        controller.set_age_text(text);
        let outcome = controller.save().await.unwrap();
        assert!(
            matches!(outcome, SaveOutcome::Rejected(ValidationIssue::InvalidAge(_))),
            "{text} should be rejected"
        );
    }
    assert!(repo.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_independent_drafts_list_in_save_order() {
    let repo = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));

    for name in ["first", "second", "third"] {
        let mut controller = controller(repo.clone(), Arc::new(FixedModel::label("burn")));
        controller.set_name(name);
        controller.set_age_text("30");
        controller.set_sex("M");
        controller.select_photo(jpeg(16, 16));
        assert!(controller.save().await.unwrap().is_saved());
    }

    let names: Vec<_> = repo.list().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["first", "second", "third"]);
}
