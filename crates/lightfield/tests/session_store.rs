use glam::DVec3;
use image::{Rgba, RgbaImage};
use lightfield::pose::perspective;
use lightfield::session::{CaptureJson, TransformJson};
use lightfield::{
    CaptureRegistry, DegenerateCapturePolicy, LightField, LightFieldOptions, LightFieldSession, Pose,
    SessionLoadError, SessionSaveError, SessionStore,
};
use std::fs;

fn pose_at(position: DVec3) -> Pose {
    Pose::looking_at(position, DVec3::ZERO, DVec3::Y, perspective(60.0, 4.0 / 3.0, 0.1, 100.0))
}

fn solid(w: u32, h: u32, value: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([value, 255 - value, 7, 255]))
}

fn ring_session(name: &str, n: usize) -> (LightFieldSession, Vec<RgbaImage>) {
    let mut captures = Vec::new();
    let mut images = Vec::new();
    for i in 0..n {
        let a = i as f64 * std::f64::consts::TAU / n as f64;
        let position = DVec3::new(a.cos(), 0.25, a.sin()) * 20.0;
        captures.push(CaptureJson {
            image_file_name: format!("img_{i}.png"),
            transform: TransformJson::from(&pose_at(position)),
        });
        images.push(solid(8, 6, (i * 20) as u8));
    }
    let session = LightFieldSession {
        session_name: name.into(),
        focal_point: DVec3::ZERO.into(),
        sphere_radius: 20.0,
        captures,
    };
    (session, images)
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let (session, images) = ring_session("ring", 5);
    let refs: Vec<&RgbaImage> = images.iter().collect();
    store.save(&session, &refs).unwrap();

    assert!(dir.path().join("ring/capture.json").is_file());
    assert!(dir.path().join("ring/CaptureImages/img_3.png").is_file());

    let (loaded, loaded_images) = store.load("ring").unwrap();
    assert_eq!(loaded, session);
    assert_eq!(loaded_images, images);
}

#[test]
fn save_rejects_mismatched_images() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let (session, images) = ring_session("ring", 3);
    let err = store.save(&session, &[&images[0]]).unwrap_err();
    assert!(matches!(err, SessionSaveError::ImageCountMismatch { captures: 3, images: 1 }));
}

#[test]
fn light_field_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let (session, images) = ring_session("ring", 8);
    let refs: Vec<&RgbaImage> = images.iter().collect();
    store.save(&session, &refs).unwrap();

    let center = DVec3::new(1.0, 2.0, 3.0);
    let lf = LightField::load(&store, "ring", 2.0, center, LightFieldOptions::default()).unwrap();
    assert_eq!(lf.len(), 8);
    assert_eq!(lf.session_name(), "ring");
    for (i, view) in lf.captures().enumerate() {
        approx::assert_abs_diff_eq!(view.viewing_position().distance(center), 2.0, epsilon = 1e-5);
        assert_eq!(view.capture.image(), &images[i]);
    }

    // Nearest to the direction of capture 2.
    let a = 2.0 * std::f64::consts::TAU / 8.0;
    let query = center + DVec3::new(a.cos(), 0.25, a.sin()).normalize() * 2.5;
    let nearest = lf.find_nearest(3, query);
    assert_eq!(nearest.len(), 3);
    assert_eq!(nearest[0].id().as_str(), "img_2.png");
    let d: Vec<f64> = nearest.iter().map(|v| v.viewing_position().distance(query)).collect();
    assert!(d.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn missing_image_aborts_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let (session, images) = ring_session("ring", 3);
    let refs: Vec<&RgbaImage> = images.iter().collect();
    store.save(&session, &refs).unwrap();
    fs::remove_file(store.image_path("ring", "img_1.png")).unwrap();

    let err = LightField::load(&store, "ring", 1.0, DVec3::ZERO, LightFieldOptions::default()).unwrap_err();
    assert!(matches!(err, SessionLoadError::Io { .. }));
}

#[test]
fn corrupt_image_aborts_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let (session, images) = ring_session("ring", 2);
    let refs: Vec<&RgbaImage> = images.iter().collect();
    store.save(&session, &refs).unwrap();
    fs::write(store.image_path("ring", "img_0.png"), b"garbage").unwrap();

    let err = store.load("ring").unwrap_err();
    assert!(matches!(err, SessionLoadError::Image { .. }));
}

#[test]
fn malformed_json_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    fs::create_dir_all(store.session_dir("bad")).unwrap();
    fs::write(store.session_file("bad"), "{ \"sessionName\": ").unwrap();
    assert!(matches!(store.read_session("bad"), Err(SessionLoadError::Json { .. })));
    assert!(matches!(store.read_session("absent"), Err(SessionLoadError::Io { .. })));
}

#[test]
fn unity_session_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let json = r#"{
        "sessionName": "unity",
        "focalPoint": { "x": 0.0, "y": 0.0, "z": 0.0 },
        "sphereRadius": 20.0,
        "captures": [ {
            "imageFileName": "photo.jpg",
            "transform": {
                "forward": { "x": 0.0, "y": 0.0, "z": -1.0 },
                "up": { "x": 0.0, "y": 1.0, "z": 0.0 },
                "right": { "x": 1.0, "y": 0.0, "z": 0.0 },
                "position": { "x": 0.0, "y": 0.0, "z": 20.0 },
                "projMatrix": {
                    "e00": 1.0, "e01": 0.0, "e02": 0.0, "e03": 0.0,
                    "e10": 0.0, "e11": 1.0, "e12": 0.0, "e13": 0.0,
                    "e20": 0.0, "e21": 0.0, "e22": -1.0, "e23": -0.2,
                    "e30": 0.0, "e31": 0.0, "e32": -1.0, "e33": 0.0
                }
            }
        } ]
    }"#;
    fs::create_dir_all(store.session_dir("unity").join("CaptureImages")).unwrap();
    fs::write(store.session_file("unity"), json).unwrap();
    image::DynamicImage::ImageRgba8(solid(4, 4, 100))
        .to_rgb8()
        .save(store.image_path("unity", "photo.jpg"))
        .unwrap();

    let lf = LightField::load(&store, "unity", 10.0, DVec3::ZERO, LightFieldOptions::default()).unwrap();
    let view = lf.get(0).unwrap();
    assert!(view.viewing_position().abs_diff_eq(DVec3::new(0.0, 0.0, 10.0), 1e-9));
    assert_eq!(view.capture.image().dimensions(), (4, 4));
    approx::assert_abs_diff_eq!(view.capture.pose().projection.w_axis.z, -0.2, epsilon = 1e-12);
}

#[test]
fn degenerate_policy_applies_to_disk_loads() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let (mut session, mut images) = ring_session("ring", 2);
    session.captures.push(CaptureJson {
        image_file_name: "center.png".into(),
        transform: TransformJson::from(&Pose::from_basis(
            DVec3::ZERO,
            DVec3::NEG_Z,
            DVec3::Y,
            perspective(60.0, 1.0, 0.1, 10.0),
        )),
    });
    images.push(solid(2, 2, 1));
    let refs: Vec<&RgbaImage> = images.iter().collect();
    store.save(&session, &refs).unwrap();

    assert!(matches!(
        LightField::load(&store, "ring", 1.0, DVec3::ZERO, LightFieldOptions::default()),
        Err(SessionLoadError::DegenerateCapture { .. })
    ));
    let skip = LightFieldOptions {
        degenerate_policy: DegenerateCapturePolicy::Skip,
        ..Default::default()
    };
    assert_eq!(LightField::load(&store, "ring", 1.0, DVec3::ZERO, skip).unwrap().len(), 2);
}

#[test]
fn live_captures_save_with_counter_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let mut registry = CaptureRegistry::new();
    for i in 0..3 {
        let position = DVec3::new(0.0, 0.0, 10.0 + i as f64);
        registry.register(solid(3, 3, i as u8), pose_at(position), None).unwrap();
    }
    let session = store
        .save_captures("live", DVec3::ZERO, 10.0, registry.as_slice())
        .unwrap();
    let names: Vec<&str> = session.captures.iter().map(|c| c.image_file_name.as_str()).collect();
    assert_eq!(names, ["img_0.png", "img_1.png", "img_2.png"]);

    let lf = LightField::load(&store, "live", 1.0, DVec3::ZERO, LightFieldOptions::default()).unwrap();
    assert_eq!(lf.len(), 3);
    assert_eq!(lf.get(1).unwrap().capture.image(), registry.as_slice()[1].image());
}

#[test]
fn image_names_cannot_escape_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("sessions");
    let store = SessionStore::new(&root);

    let (mut session, images) = ring_session("ring", 2);
    session.captures[1].image_file_name = "../../outside.png".into();
    let refs: Vec<&RgbaImage> = images.iter().collect();
    let err = store.save(&session, &refs).unwrap_err();
    assert!(matches!(err, SessionSaveError::InvalidImageName { .. }));
    assert!(!dir.path().join("outside.png").exists());
    assert!(!store.session_dir("ring").exists());

    // A hand-edited capture.json pointing outside the image directory.
    session.captures[1].image_file_name = "img_1.png".into();
    store.save(&session, &refs).unwrap();
    fs::write(dir.path().join("secret.png"), b"not for you").unwrap();
    let mut tampered = store.read_session("ring").unwrap();
    tampered.captures[0].image_file_name = dir.path().join("secret.png").display().to_string();
    fs::write(store.session_file("ring"), tampered.to_json_string().unwrap()).unwrap();

    let err = LightField::load(&store, "ring", 1.0, DVec3::ZERO, LightFieldOptions::default()).unwrap_err();
    assert!(matches!(err, SessionLoadError::InvalidImageName { .. }));
}
