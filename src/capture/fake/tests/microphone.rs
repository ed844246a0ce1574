use super::*;

#[tokio::test]
async fn test_fake_backend_microphone_succeeds() {
    let backend = FakeCaptureBackend::succeeding();

    let handle = backend
        .acquire_microphone(&AudioConstraints::default())
        .await
        .unwrap();
    assert_eq!(handle.kind(), StreamKind::Microphone);
    assert_eq!(handle.info().tracks[0].label, "Default Microphone");
    assert_eq!(backend.microphone_requests(), 1);
    assert_eq!(backend.live_tracks(), 1);
}

#[tokio::test]
async fn test_fake_backend_microphone_uses_device() {
    let backend = FakeCaptureBackend::succeeding();
    let constraints = AudioConstraints {
        device: Some("alsa_input.usb-mic".to_string()),
    };

    let handle = backend.acquire_microphone(&constraints).await.unwrap();
    assert_eq!(handle.info().tracks[0].label, "alsa_input.usb-mic");
    assert_eq!(backend.last_constraints(), Some(constraints));
}

#[tokio::test]
async fn test_fake_backend_microphone_failures() {
    for (outcome, prefix) in [
        (FakeOutcome::PermissionDenied, "Permission denied"),
        (FakeOutcome::NoDevice, "No source available"),
        (FakeOutcome::DeviceBusy, "Device busy"),
    ] {
        let backend = FakeCaptureBackend::microphone_failing(outcome);
        let err = backend
            .acquire_microphone(&AudioConstraints::default())
            .await
            .unwrap_err();
        assert!(
            err.to_string().starts_with(prefix),
            "unexpected error for {:?}: {}",
            outcome,
            err
        );
        assert_eq!(backend.live_tracks(), 0);
    }
}

#[tokio::test]
async fn test_fake_backend_dropped_handle_stops_tracks() {
    let backend = FakeCaptureBackend::succeeding();
    {
        let _screen = backend.acquire_screen(&test_request()).await.unwrap();
        let _mic = backend
            .acquire_microphone(&AudioConstraints::default())
            .await
            .unwrap();
        assert_eq!(backend.live_tracks(), 2);
    }
    assert_eq!(backend.live_tracks(), 0);
}
