//! Face check-in: extract, gate on quality, match against stored profiles.
//!
//! [`CheckinService`] only decides who is in front of the camera;
//! [`check_in_by_face`] then records the attendance for that employee.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use facecheck_core::encoding;
use facecheck_core::{
    decode_profile, quality_gate, CosineMatcher, FaceProfile, FeatureVector, MatchError, Matcher,
    Thresholds,
};
use serde::Serialize;

use crate::error::ServiceError;
use crate::recognition::{ExtractedFace, FeatureExtractor};
use crate::store::{Attendance, Employee, ProfileSource, ProfileWrite, Store, StoredProfile};

/// One ranked comparison, named for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEmployee {
    pub employee_id: String,
    pub employee_name: String,
    pub confidence: f32,
}

/// An accepted identification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    pub employee_id: String,
    pub employee_name: String,
    pub confidence: f32,
    pub confidence_threshold: f32,
    pub face_quality: f32,
    pub faces_count: u32,
    pub features_extracted: usize,
    pub profiles_considered: usize,
    pub profiles_skipped: usize,
    pub ranked: Vec<RankedEmployee>,
}

/// Outcome of registering a face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub profile: ProfileWrite,
    pub feature_count: usize,
}

/// Attendance opened by a face check-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceCheckin {
    pub attendance: Attendance,
    pub employee_email: String,
    pub recognition_info: Recognition,
}

pub struct CheckinService<E, S> {
    extractor: E,
    profiles: S,
    thresholds: Thresholds,
    quality_min: f32,
    timeout: Duration,
}

impl<E: FeatureExtractor, S: ProfileSource> CheckinService<E, S> {
    pub fn new(
        extractor: E,
        profiles: S,
        thresholds: Thresholds,
        quality_min: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            extractor,
            profiles,
            thresholds,
            quality_min,
            timeout,
        }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Identify the face in `image`, bounded by the check-in timeout.
    pub async fn recognize(&self, image: &str) -> Result<Recognition, ServiceError> {
        match tokio::time::timeout(self.timeout, self.run(image)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "check-in timed out");
                Err(ServiceError::Timeout(self.timeout))
            }
        }
    }

    async fn run(&self, image: &str) -> Result<Recognition, ServiceError> {
        let ExtractedFace {
            faces_count,
            face_quality,
            face_features,
        } = self.extractor.extract(image).await?;
        tracing::info!(
            faces = faces_count,
            quality = face_quality,
            features = face_features.len(),
            "face extracted"
        );

        if let Err(e) = quality_gate(face_quality, self.quality_min) {
            tracing::warn!(
                quality = face_quality,
                minimum = self.quality_min,
                "face quality too low"
            );
            return Err(e.into());
        }

        let query = FeatureVector::new(face_features);
        if query.is_empty() {
            return Err(MatchError::InvalidInput("no face features extracted".into()).into());
        }

        let stored = self.profiles.face_profiles().await?;
        let profiles_considered = stored.len();
        let (gallery, names) = decode_gallery(stored);
        let profiles_skipped = profiles_considered - gallery.len();

        let result = CosineMatcher
            .compare(&query, &gallery, &self.thresholds)
            .map_err(|e| {
                tracing::warn!(
                    error = %e,
                    profiles = profiles_considered,
                    skipped = profiles_skipped,
                    "no confident match"
                );
                e
            })?;

        let name_of = |id: &str| names.get(id).cloned().unwrap_or_default();
        let ranked = result
            .ranked
            .iter()
            .map(|c| RankedEmployee {
                employee_id: c.employee_id.clone(),
                employee_name: name_of(&c.employee_id),
                confidence: c.similarity,
            })
            .collect();

        tracing::info!(
            employee_id = %result.employee_id,
            confidence = result.similarity,
            "face recognized"
        );

        Ok(Recognition {
            employee_name: name_of(&result.employee_id),
            employee_id: result.employee_id,
            confidence: result.similarity,
            confidence_threshold: result.threshold,
            face_quality,
            faces_count,
            features_extracted: query.len(),
            profiles_considered,
            profiles_skipped,
            ranked,
        })
    }
}

/// Decode every stored profile once. Undecodable ones are logged and dropped.
fn decode_gallery(stored: Vec<StoredProfile>) -> (Vec<FaceProfile>, HashMap<String, String>) {
    let mut gallery = Vec::with_capacity(stored.len());
    let mut names = HashMap::with_capacity(stored.len());

    for profile in stored {
        match decode_profile(&profile.encoding) {
            Ok(vector) => {
                names.insert(profile.employee_id.clone(), profile.employee_name);
                gallery.push(FaceProfile {
                    employee_id: profile.employee_id,
                    vector,
                });
            }
            Err(e) => {
                tracing::warn!(
                    employee_id = %profile.employee_id,
                    error = %e,
                    "skipping undecodable face profile"
                );
            }
        }
    }

    (gallery, names)
}

/// Validate a base64 encoding and make it the employee's only profile.
pub async fn store_encoding(
    store: &Store,
    employee_id: &str,
    wire: &str,
) -> Result<Registration, ServiceError> {
    let stored = encoding::from_base64(wire)?;
    let vector = decode_profile(&stored)?;
    let profile = store.upsert_profile(employee_id, stored).await?;
    Ok(Registration {
        profile,
        feature_count: vector.len(),
    })
}

/// Run a registration burst through the recognition service and store the result.
pub async fn register_face<E: FeatureExtractor>(
    extractor: &E,
    store: &Store,
    employee: &Employee,
    frames: &[String],
) -> Result<(Registration, serde_json::Value), ServiceError> {
    if frames.is_empty() {
        return Err(ServiceError::MalformedPayload("no video frames provided".into()));
    }
    let registered = extractor
        .register(&employee.id, &employee.full_name, frames)
        .await?;
    let registration = store_encoding(store, &employee.id, &registered.encoding).await?;

    tracing::info!(
        employee_id = %employee.id,
        features = registration.feature_count,
        replaced = registration.profile.replaced,
        "face registered"
    );
    Ok((registration, registered.processing_result))
}

/// Recognize the face in `image` and open the matched employee's attendance at `at`.
///
/// Employees without an email on record are refused before anything is written.
pub async fn check_in_by_face<E: FeatureExtractor, S: ProfileSource>(
    service: &CheckinService<E, S>,
    store: &Store,
    image: &str,
    at: DateTime<Utc>,
) -> Result<FaceCheckin, ServiceError> {
    let recognition = service.recognize(image).await?;
    let employee = store.employee(&recognition.employee_id).await?;
    let Some(employee_email) = employee.email else {
        tracing::warn!(employee_id = %employee.id, "recognized employee has no email");
        return Err(ServiceError::IncompleteEmployee(employee.id));
    };
    let attendance = store.check_in(&employee.id, at, None).await?;

    Ok(FaceCheckin {
        attendance,
        employee_email,
        recognition_info: recognition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewEmployee, StoreError};
    use crate::testing::FakeExtractor;
    use facecheck_core::{EncodingDocument, ErrorKind};

    /// Profiles panic when fetched: proves the matcher was never reached.
    struct UnreachableProfiles;

    impl ProfileSource for UnreachableProfiles {
        async fn face_profiles(&self) -> Result<Vec<StoredProfile>, StoreError> {
            panic!("profiles must not be fetched");
        }
    }

    struct StaticProfiles(Vec<StoredProfile>);

    impl ProfileSource for StaticProfiles {
        async fn face_profiles(&self) -> Result<Vec<StoredProfile>, StoreError> {
            Ok(self.0.clone())
        }
    }

    fn stored(id: &str, name: &str, features: &[f32]) -> StoredProfile {
        StoredProfile {
            employee_id: id.into(),
            employee_name: name.into(),
            encoding: EncodingDocument::from_features(id, features.to_vec())
                .to_bytes()
                .unwrap(),
        }
    }

    fn service<S: ProfileSource>(
        extractor: FakeExtractor,
        profiles: S,
    ) -> CheckinService<FakeExtractor, S> {
        CheckinService::new(
            extractor,
            profiles,
            Thresholds::default(),
            facecheck_core::QUALITY_MIN,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_recognize_accepts_best_match() {
        let profiles = StaticProfiles(vec![
            stored("a", "An", &[1.0, 0.0, 0.0, 0.0]),
            stored("b", "Binh", &[0.0, 1.0, 0.0, 0.0]),
        ]);
        let svc = service(FakeExtractor::new(0.9, &[1.0, 0.0, 0.0, 0.0]), profiles);

        let rec = svc.recognize("img").await.unwrap();
        assert_eq!(rec.employee_id, "a");
        assert_eq!(rec.employee_name, "An");
        assert!((rec.confidence - 1.0).abs() < 1e-6);
        assert_eq!(rec.confidence_threshold, 0.5);
        assert_eq!(rec.features_extracted, 4);
        assert_eq!(rec.ranked.len(), 2);
        assert_eq!(rec.ranked[1].employee_name, "Binh");
    }

    #[tokio::test]
    async fn test_low_quality_fails_before_matching() {
        let svc = service(FakeExtractor::new(0.2, &[1.0, 0.0]), UnreachableProfiles);
        let err = svc.recognize("img").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Match(ref e) if e.kind() == ErrorKind::LowQuality
        ));
    }

    #[tokio::test]
    async fn test_empty_features_rejected_before_fetch() {
        let svc = service(FakeExtractor::new(0.9, &[]), UnreachableProfiles);
        let err = svc.recognize("img").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Match(ref e) if e.kind() == ErrorKind::InvalidInput
        ));
    }

    #[tokio::test]
    async fn test_undecodable_profiles_are_skipped() {
        let mut profiles = vec![
            StoredProfile {
                employee_id: "broken".into(),
                employee_name: "Broken".into(),
                encoding: b"not json".to_vec(),
            },
            StoredProfile {
                employee_id: "empty".into(),
                employee_name: "Empty".into(),
                encoding: br#"{"features":[]}"#.to_vec(),
            },
        ];
        profiles.push(stored("c", "Cuong", &[1.0, 0.0]));
        let svc = service(FakeExtractor::new(0.9, &[1.0, 1.0]), StaticProfiles(profiles));

        let rec = svc.recognize("img").await.unwrap();
        assert_eq!(rec.employee_id, "c");
        assert_eq!(rec.profiles_considered, 3);
        assert_eq!(rec.profiles_skipped, 2);
        assert!((rec.confidence - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_low_confidence_and_not_found() {
        let y = (1.0f32 - 0.42 * 0.42).sqrt();
        let svc = service(
            FakeExtractor::new(0.9, &[1.0, 0.0]),
            StaticProfiles(vec![stored("d", "Dung", &[0.42, y])]),
        );
        let err = svc.recognize("img").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Match(MatchError::LowConfidence { score, .. })
                if (score - 0.42).abs() < 1e-5
        ));

        let svc = service(
            FakeExtractor::new(0.9, &[1.0, 0.0]),
            StaticProfiles(vec![stored("e", "Em", &[0.6, 0.3, 0.1])]),
        );
        let err = svc.recognize("img").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Match(MatchError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_recognize_times_out() {
        let mut extractor = FakeExtractor::new(0.9, &[1.0]);
        extractor.delay = Duration::from_secs(5);
        let svc = CheckinService::new(
            extractor,
            StaticProfiles(Vec::new()),
            Thresholds::default(),
            facecheck_core::QUALITY_MIN,
            Duration::from_millis(20),
        );
        let err = svc.recognize("img").await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_recognize_against_store() {
        let store = Store::open_in_memory().await.unwrap();
        let employee = store
            .create_employee(NewEmployee {
                full_name: "Giang".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let extractor = FakeExtractor::new(0.8, &[0.3, 0.4, 0.5]);

        let (registration, _) = register_face(&extractor, &store, &employee, &["frame".into()])
            .await
            .unwrap();
        assert_eq!(registration.feature_count, 3);
        assert!(!registration.profile.replaced);

        let svc = service(extractor, store.clone());
        let rec = svc.recognize("img").await.unwrap();
        assert_eq!(rec.employee_id, employee.id);
        assert_eq!(rec.employee_name, "Giang");
    }

    #[tokio::test]
    async fn test_store_encoding_rejects_bad_payloads() {
        let store = Store::open_in_memory().await.unwrap();
        let employee = store
            .create_employee(NewEmployee {
                full_name: "Hai".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store_encoding(&store, &employee.id, "%%%").await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));

        let empty = encoding::to_base64(br#"{"features":[]}"#);
        let err = store_encoding(&store, &employee.id, &empty).await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
        assert!(!store.profile_exists(&employee.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_register_requires_frames() {
        let store = Store::open_in_memory().await.unwrap();
        let employee = store
            .create_employee(NewEmployee {
                full_name: "Khoa".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let err = register_face(&FakeExtractor::new(0.9, &[1.0]), &store, &employee, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MalformedPayload(_)));
    }

    async fn registered(store: &Store, name: &str, email: Option<&str>) -> Employee {
        let employee = store
            .create_employee(NewEmployee {
                full_name: name.into(),
                email: email.map(str::to_string),
                ..Default::default()
            })
            .await
            .unwrap();
        let wire = crate::testing::encode_features(&employee.id, vec![0.2, 0.9, 0.1]).unwrap();
        store_encoding(store, &employee.id, &wire).await.unwrap();
        employee
    }

    #[tokio::test]
    async fn test_check_in_by_face_once_per_day() {
        let store = Store::open_in_memory().await.unwrap();
        let employee = registered(&store, "Phuong", Some("phuong@example.com")).await;
        let svc = service(FakeExtractor::new(0.8, &[0.2, 0.9, 0.1]), store.clone());
        let at = Utc::now();

        let checkin = check_in_by_face(&svc, &store, "img", at).await.unwrap();
        assert_eq!(checkin.attendance.employee_id, employee.id);
        assert_eq!(checkin.employee_email, "phuong@example.com");
        assert_eq!(checkin.recognition_info.employee_name, "Phuong");

        let again = check_in_by_face(&svc, &store, "img", at).await.unwrap_err();
        assert!(matches!(again, ServiceError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_check_in_by_face_requires_email() {
        let store = Store::open_in_memory().await.unwrap();
        let employee = registered(&store, "Son", None).await;
        let svc = service(FakeExtractor::new(0.8, &[0.2, 0.9, 0.1]), store.clone());

        let err = check_in_by_face(&svc, &store, "img", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::IncompleteEmployee(ref id) if *id == employee.id));
        assert!(store
            .active_today(&employee.id, Utc::now())
            .await
            .unwrap()
            .is_none());
    }
}
