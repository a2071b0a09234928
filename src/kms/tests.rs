use {
    crate::{
        format::{ARGB8888, Format, XRGB8888},
        kms::{
            Device, DumbFramebuffer, EventDispatcher, FbRef, KmsError, LoopAction, OutFence,
            PlaneType,
            test_kernel::{PLANE_TYPE_CURSOR, PLANE_TYPE_OVERLAY, PLANE_TYPE_PRIMARY, TestKernel},
        },
        video::drm::{
            CONNECTOR_STATUS_CONNECTED, DRM_CAP_CURSOR_HEIGHT, DRM_CAP_CURSOR_WIDTH,
            DRM_CAP_DUMB_BUFFER, DRM_MODE_ATOMIC_ALLOW_MODESET, DRM_MODE_ATOMIC_NONBLOCK,
            DRM_MODE_ATOMIC_TEST_ONLY, DRM_MODE_CONNECTOR_HDMIA, DRM_MODE_CONNECTOR_WRITEBACK,
            DRM_MODE_PAGE_FLIP_EVENT, DRM_MODE_TYPE_PREFERRED, DrmConnector, DrmConnectorInfo,
            DrmCrtc, DrmCrtcInfo, DrmEncoder, DrmFb, DrmModeInfo, DrmObject, DrmPlane,
        },
    },
    std::{cell::Cell, rc::Rc, time::Duration},
};

fn mode(width: u16, height: u16) -> DrmModeInfo {
    DrmModeInfo {
        clock: 148500,
        hdisplay: width,
        hsync_start: width + 88,
        hsync_end: width + 132,
        htotal: width + 280,
        vdisplay: height,
        vsync_start: height + 4,
        vsync_end: height + 9,
        vtotal: height + 45,
        vrefresh: 60,
        name: format!("{}x{}", width, height).into(),
        ..Default::default()
    }
}

fn connector_info(encoders: Vec<DrmEncoder>, modes: Vec<DrmModeInfo>) -> DrmConnectorInfo {
    DrmConnectorInfo {
        encoders,
        modes,
        connector_type: DRM_MODE_CONNECTOR_HDMIA,
        connector_type_id: 1,
        connection: CONNECTOR_STATUS_CONNECTED,
        mm_width: 520,
        mm_height: 290,
    }
}

struct Output {
    kernel: Rc<TestKernel>,
    crtc: DrmCrtc,
    connector: DrmConnector,
    plane: DrmPlane,
}

/// One connector that can be driven by the only CRTC, and a primary plane.
fn single_output() -> Output {
    let kernel = TestKernel::new();
    let crtc = kernel.add_crtc();
    let encoder = kernel.add_encoder(0b1);
    let mut preferred = mode(1920, 1080);
    preferred.ty |= DRM_MODE_TYPE_PREFERRED;
    let connector = kernel.add_connector(connector_info(
        vec![encoder],
        vec![mode(1280, 720), preferred],
    ));
    let plane = kernel.add_plane(PLANE_TYPE_PRIMARY, 0b1);
    Output {
        kernel,
        crtc,
        connector,
        plane,
    }
}

fn fb(id: u32, width: u32, height: u32) -> FbRef {
    FbRef {
        id: DrmFb(id),
        width,
        height,
    }
}

fn device(kernel: &Rc<TestKernel>) -> Device {
    Device::new(kernel.clone()).unwrap()
}

#[test]
fn single_output_modeset() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = dev.find_crtc(out.crtc).unwrap().clone();
    let connector = &dev.connectors()[0];
    let plane = &dev.planes()[0];
    assert_eq!(plane.ty, PlaneType::Primary);
    assert!(connector.is_connected());
    assert_eq!(connector.name(), "HDMI-A-1");

    let mode = connector.preferred_mode().unwrap().clone();
    assert_eq!(mode.hdisplay, 1920);
    crtc.set_mode(Some(&mode)).unwrap();
    assert!(connector.set_crtc(Some(&crtc)));
    assert!(plane.set_crtc(Some(&crtc)));
    let pending = plane.pending();
    assert_eq!((pending.x, pending.y), (0, 0));
    assert_eq!((pending.width, pending.height), (1920, 1080));
    plane.set_framebuffer(Some(fb(500, 1920, 1080)));

    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();

    let k = &*out.kernel;
    let commit = k.last_commit().unwrap();
    assert_eq!(commit.flags, DRM_MODE_ATOMIC_ALLOW_MODESET);
    let blob = crtc.current().mode_blob();
    assert!(blob.is_some());
    assert_eq!(commit.value(out.crtc, "MODE_ID", k), Some(blob.0 as u64));
    assert_eq!(commit.value(out.crtc, "ACTIVE", k), Some(1));
    assert_eq!(
        commit.value(out.connector, "CRTC_ID", k),
        Some(out.crtc.0 as u64)
    );
    assert_eq!(commit.value(out.plane, "CRTC_ID", k), Some(out.crtc.0 as u64));
    assert_eq!(commit.value(out.plane, "FB_ID", k), Some(500));
    assert_eq!(commit.value(out.plane, "CRTC_W", k), Some(1920));
    assert_eq!(commit.value(out.plane, "CRTC_H", k), Some(1080));
    assert_eq!(commit.value(out.plane, "SRC_X", k), Some(0));
    assert_eq!(commit.value(out.plane, "SRC_W", k), Some(1920 << 16));
    assert_eq!(commit.value(out.plane, "SRC_H", k), Some(1080 << 16));
    assert_eq!(commit.objects(), [out.connector.0, out.crtc.0, out.plane.0]);

    assert_eq!(crtc.current_mode(), Some(mode));
    assert_eq!(connector.current().crtc_id(), out.crtc);
    assert_eq!(plane.current().fb, Some(fb(500, 1920, 1080)));
    assert_eq!(k.blobs_created.get(), 1);
}

#[test]
fn plane_outside_mask_is_rejected() {
    let kernel = TestKernel::new();
    let crtc = kernel.add_crtc();
    kernel.add_plane(PLANE_TYPE_OVERLAY, 0b10);
    let dev = device(&kernel);
    let crtc = dev.find_crtc(crtc).unwrap();
    let plane = &dev.planes()[0];
    assert!(!plane.set_crtc(Some(crtc)));
    assert!(plane.pending().crtc.is_none());
    assert!(plane.set_crtc(None));
}

#[test]
fn connector_mask_is_encoder_intersection() {
    let kernel = TestKernel::new();
    let crtcs = [kernel.add_crtc(), kernel.add_crtc(), kernel.add_crtc()];
    let e1 = kernel.add_encoder(0b011);
    let e2 = kernel.add_encoder(0b110);
    kernel.add_connector(connector_info(vec![e1, e2], vec![]));
    kernel.add_connector(connector_info(vec![], vec![]));
    let dev = device(&kernel);
    let both = &dev.connectors()[0];
    let none = &dev.connectors()[1];
    assert_eq!(both.possible_crtcs, 0b010);
    assert_eq!(none.possible_crtcs, 0);
    let crtc = |i: usize| dev.find_crtc(crtcs[i]).unwrap();
    assert_eq!(crtc(2).idx, 2);
    assert!(!both.set_crtc(Some(crtc(0))));
    assert!(!both.set_crtc(Some(crtc(2))));
    assert!(both.pending().crtc.is_none());
    assert!(both.set_crtc(Some(crtc(1))));
    assert_eq!(both.pending().crtc_id(), crtcs[1]);
    assert!(both.set_crtc(Some(crtc(1))));
    for i in 0..3 {
        assert!(!none.set_crtc(Some(crtc(i))));
    }
}

#[test]
fn unknown_encoder_fails_setup() {
    let kernel = TestKernel::new();
    kernel.add_crtc();
    kernel.add_connector(connector_info(vec![DrmEncoder(4242)], vec![]));
    let res = Device::new(kernel.clone());
    assert!(matches!(
        res,
        Err(KmsError::UnknownEncoder {
            encoder: DrmEncoder(4242),
            ..
        })
    ));
}

#[test]
fn refused_atomic_cap_fails_setup() {
    let kernel = TestKernel::new();
    kernel.refuse_client_caps.set(true);
    assert!(matches!(
        Device::new(kernel.clone()),
        Err(KmsError::Atomic(_))
    ));
}

#[test]
fn identical_mode_creates_one_blob() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = &dev.crtcs()[0];
    let k = &*out.kernel;
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    assert_eq!(k.blobs_created.get(), 1);
    assert!(crtc.pending().enabled());

    crtc.set_mode(Some(&mode(1280, 720))).unwrap();
    assert_eq!(k.blobs_created.get(), 2);
    assert_eq!(k.blobs_destroyed.borrow().len(), 1);

    crtc.set_mode(None).unwrap();
    assert_eq!(k.blobs_destroyed.borrow().len(), 2);
    assert!(!crtc.pending().active);
    assert_eq!(k.live_blobs(), 0);
}

#[test]
fn committed_blob_lives_until_replaced_in_current() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = &dev.crtcs()[0];
    let k = &*out.kernel;
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    crtc.set_mode(None).unwrap();
    assert!(k.blobs_destroyed.borrow().is_empty());
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    assert_eq!(k.blobs_destroyed.borrow().len(), 1);
    let commit = k.last_commit().unwrap();
    assert_eq!(commit.value(out.crtc, "MODE_ID", k), Some(0));
    assert_eq!(commit.value(out.crtc, "ACTIVE", k), Some(0));
}

#[test]
fn active_without_mode_is_not_serialized() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = &dev.crtcs()[0];
    crtc.set_active(true);
    dev.commit(0, 0).unwrap();
    let k = &*out.kernel;
    let commit = k.last_commit().unwrap();
    assert_eq!(commit.value(out.crtc, "ACTIVE", k), Some(0));
    assert!(crtc.current().active);
    assert!(!crtc.current().enabled());
}

#[test]
fn rejected_commit_changes_nothing() {
    let out = single_output();
    let dev = device(&out.kernel);
    let k = &*out.kernel;
    let crtc = &dev.crtcs()[0];
    let connector = &dev.connectors()[0];
    let plane = &dev.planes()[0];
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    connector.set_crtc(Some(crtc));
    plane.set_crtc(Some(crtc));
    plane.set_framebuffer(Some(fb(7, 1920, 1080)));

    k.reject_next_commit.set(true);
    let res = dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0);
    assert!(matches!(res, Err(KmsError::Commit(_))));
    assert!(k.commits.borrow().is_empty());
    assert_eq!(crtc.current_mode(), None);
    assert!(connector.current().crtc.is_none());
    assert!(plane.current().crtc.is_none());
    assert!(plane.current().fb.is_none());
    assert!(crtc.pending_mode().is_some());

    dev.test_commit(DRM_MODE_ATOMIC_ALLOW_MODESET).unwrap();
    let tested = k.last_commit().unwrap();
    assert_eq!(
        tested.flags,
        DRM_MODE_ATOMIC_ALLOW_MODESET | DRM_MODE_ATOMIC_TEST_ONLY
    );
    assert_eq!(crtc.current_mode(), None);

    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    let committed = k.last_commit().unwrap();
    assert_eq!(committed.writes, tested.writes);
    assert_eq!(crtc.current_mode(), Some(mode(1920, 1080)));
}

#[test]
fn discarded_pending_state_matches_current() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = &dev.crtcs()[0];
    let plane = &dev.planes()[0];
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    plane.set_crtc(Some(crtc));
    dev.discard_pending();
    assert!(crtc.pending_mode().is_none());
    assert!(plane.pending().crtc.is_none());
    assert_eq!(out.kernel.live_blobs(), 0);
}

#[test]
fn plane_without_framebuffer_is_disabled() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = &dev.crtcs()[0];
    let plane = &dev.planes()[0];
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    assert!(plane.set_crtc(Some(crtc)));
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    let k = &*out.kernel;
    let commit = k.last_commit().unwrap();
    let writes: Vec<_> = commit
        .writes
        .iter()
        .filter(|w| w.0 == out.plane.0)
        .map(|w| (w.1, w.2))
        .collect();
    assert_eq!(writes, [(k.prop_id("CRTC_ID"), 0), (k.prop_id("FB_ID"), 0)]);
}

#[test]
fn plane_alpha_is_clamped() {
    let kernel = TestKernel::new();
    let crtc = kernel.add_crtc();
    let plane = kernel.add_plane(PLANE_TYPE_OVERLAY, 0b1);
    kernel.set_prop(plane, "alpha", 0xffff);
    let plain = kernel.add_plane(PLANE_TYPE_OVERLAY, 0b1);
    let dev = device(&kernel);
    let crtc = dev.find_crtc(crtc).unwrap();
    let (with_alpha, without_alpha) = (&dev.planes()[0], &dev.planes()[1]);
    assert!(with_alpha.supports_alpha());
    assert!(!without_alpha.supports_alpha());
    for p in dev.planes() {
        assert!(p.set_crtc(Some(crtc)));
        p.set_framebuffer(Some(fb(9, 64, 64)));
        p.set_position(-10, 20);
        p.set_size(64, 64);
    }
    with_alpha.set_alpha(2.0);
    assert_eq!(with_alpha.pending().alpha, 1.0);
    dev.commit(0, 0).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.value(plane, "alpha", &kernel), Some(0xffff));
    assert_eq!(commit.value(plane, "CRTC_X", &kernel), Some(-10i64 as u64));
    assert_eq!(commit.value(plane, "CRTC_Y", &kernel), Some(20));
    assert_eq!(commit.value(plain, "alpha", &kernel), None);
    assert_eq!(commit.value(plain, "CRTC_W", &kernel), Some(64));

    with_alpha.set_alpha(-1.0);
    dev.commit(0, 0).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.value(plane, "alpha", &kernel), Some(0));
}

#[test]
fn cursor_plane_uses_cursor_size() {
    let kernel = TestKernel::new();
    kernel.caps.borrow_mut().insert(DRM_CAP_CURSOR_WIDTH, 128);
    kernel.caps.borrow_mut().insert(DRM_CAP_CURSOR_HEIGHT, 96);
    let crtc = kernel.add_crtc();
    kernel.add_plane(PLANE_TYPE_CURSOR, 0b1);
    kernel.add_plane(PLANE_TYPE_OVERLAY, 0b1);
    let dev = device(&kernel);
    assert_eq!(dev.caps().cursor_width, 128);
    let crtc = dev.find_crtc(crtc).unwrap();
    let (cursor, overlay) = (&dev.planes()[0], &dev.planes()[1]);
    assert_eq!(cursor.ty, PlaneType::Cursor);
    overlay.set_size(10, 20);
    assert!(cursor.set_crtc(Some(crtc)));
    assert!(overlay.set_crtc(Some(crtc)));
    let cursor = cursor.pending();
    assert_eq!((cursor.width, cursor.height), (128, 96));
    let overlay = overlay.pending();
    assert_eq!((overlay.width, overlay.height), (10, 20));
}

#[test]
fn cursor_size_defaults_without_cap() {
    let kernel = TestKernel::new();
    let dev = device(&kernel);
    assert_eq!(dev.caps().cursor_width, 64);
    assert_eq!(dev.caps().cursor_height, 64);
    assert!(dev.caps().dumb_buffers);
}

#[test]
fn discovered_mode_is_not_recreated() {
    let kernel = TestKernel::new();
    let crtc = kernel.add_crtc();
    let mode = mode(2560, 1440);
    let blob = kernel.insert_blob(mode.to_raw().as_bytes().to_vec());
    kernel.set_prop(crtc, "MODE_ID", blob.0 as u64);
    kernel.set_prop(crtc, "ACTIVE", 1);
    let dev = device(&kernel);
    let kcrtc = dev.find_crtc(crtc).unwrap();
    assert_eq!(kcrtc.current_mode(), Some(mode.clone()));
    assert!(kcrtc.current().active);
    assert!(!kcrtc.current().mode.unwrap().owns_blob());

    kcrtc.set_mode(Some(&mode)).unwrap();
    assert_eq!(kernel.blobs_created.get(), 0);
    dev.commit(0, 0).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.value(crtc, "MODE_ID", &kernel), Some(blob.0 as u64));

    drop(dev);
    assert!(kernel.blobs_destroyed.borrow().is_empty());
    assert!(kernel.blobs.borrow().contains_key(&blob));
}

#[test]
fn invalid_discovered_mode_fails_setup() {
    let kernel = TestKernel::new();
    let crtc = kernel.add_crtc();
    let blob = kernel.insert_blob(vec![1, 2, 3]);
    kernel.set_prop(crtc, "MODE_ID", blob.0 as u64);
    assert!(matches!(
        Device::new(kernel.clone()),
        Err(KmsError::InvalidModeBlob(c)) if c == crtc
    ));
}

#[test]
fn owned_blobs_are_destroyed_with_device() {
    let out = single_output();
    let dev = device(&out.kernel);
    dev.crtcs()[0].set_mode(Some(&mode(1920, 1080))).unwrap();
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    assert_eq!(out.kernel.live_blobs(), 1);
    drop(dev);
    assert_eq!(out.kernel.live_blobs(), 0);
}

/// A writeback connector that can be driven by the only CRTC.
fn writeback_output() -> (Rc<TestKernel>, DrmCrtc, DrmConnector) {
    let kernel = TestKernel::new();
    let crtc = kernel.add_crtc();
    let encoder = kernel.add_encoder(0b1);
    let mut info = connector_info(vec![encoder], vec![]);
    info.connector_type = DRM_MODE_CONNECTOR_WRITEBACK;
    let connector = kernel.add_connector(info);
    kernel.make_writeback(connector, &[XRGB8888.drm, ARGB8888.drm]);
    (kernel, crtc, connector)
}

fn attach_writeback(dev: &Device, crtc: DrmCrtc) {
    let wb = &dev.connectors()[0];
    let kcrtc = dev.find_crtc(crtc).unwrap();
    kcrtc.set_mode(Some(&mode(640, 480))).unwrap();
    assert!(wb.set_crtc(Some(kcrtc)));
}

#[test]
fn writeback_request_fires_once() {
    let (kernel, crtc, connector) = writeback_output();
    let dev = device(&kernel);
    let wb = &dev.connectors()[0];
    assert!(wb.is_writeback());
    assert_eq!(wb.name(), "Writeback-1");
    assert_eq!(wb.writeback_formats(), [XRGB8888.drm, ARGB8888.drm]);

    attach_writeback(&dev, crtc);
    let fence = OutFence::new();
    wb.set_writeback(fb(77, 640, 480), &fence);
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.value(connector, "WRITEBACK_FB_ID", &kernel), Some(77));
    let ptr = commit.value(connector, "WRITEBACK_OUT_FENCE_PTR", &kernel);
    assert!(ptr.is_some_and(|p| p != 0));
    fence.wait(Duration::from_millis(100)).unwrap();
    assert!(fence.take().is_some());
    assert!(fence.take().is_none());
    assert!(matches!(
        fence.wait(Duration::ZERO),
        Err(KmsError::NoFence)
    ));

    dev.commit(0, 0).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.value(connector, "WRITEBACK_FB_ID", &kernel), Some(0));
    assert_eq!(
        commit.value(connector, "WRITEBACK_OUT_FENCE_PTR", &kernel),
        Some(0)
    );
}

#[test]
fn writeback_fence_outlives_dropped_handle() {
    let (kernel, crtc, _) = writeback_output();
    let dev = device(&kernel);
    attach_writeback(&dev, crtc);
    let wb = &dev.connectors()[0];
    let fence = OutFence::new();
    let weak = Rc::downgrade(&fence);
    wb.set_writeback(fb(77, 640, 480), &fence);
    drop(fence);

    let filled = Rc::new(Cell::new(false));
    {
        let weak = weak.clone();
        let filled = filled.clone();
        *kernel.commit_hook.borrow_mut() = Some(Box::new(move || {
            if let Some(fence) = weak.upgrade() {
                filled.set(fence.take().is_some());
            }
        }));
    }
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    assert!(filled.get());
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_commit_keeps_writeback_request() {
    let (kernel, crtc, connector) = writeback_output();
    let dev = device(&kernel);
    attach_writeback(&dev, crtc);
    let wb = &dev.connectors()[0];
    let fence = OutFence::new();
    wb.set_writeback(fb(77, 640, 480), &fence);

    dev.test_commit(DRM_MODE_ATOMIC_ALLOW_MODESET).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_ne!(commit.flags & DRM_MODE_ATOMIC_TEST_ONLY, 0);
    assert_eq!(commit.value(connector, "WRITEBACK_FB_ID", &kernel), Some(77));
    assert_eq!(
        commit.value(connector, "WRITEBACK_OUT_FENCE_PTR", &kernel),
        Some(0)
    );
    assert!(matches!(
        fence.wait(Duration::ZERO),
        Err(KmsError::NoFence)
    ));

    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.value(connector, "WRITEBACK_FB_ID", &kernel), Some(77));
    let ptr = commit.value(connector, "WRITEBACK_OUT_FENCE_PTR", &kernel);
    assert!(ptr.is_some_and(|p| p != 0));
    fence.wait(Duration::from_millis(100)).unwrap();
}

#[test]
fn ordinary_connectors_have_no_writeback() {
    let out = single_output();
    let dev = device(&out.kernel);
    let connector = &dev.connectors()[0];
    assert!(!connector.is_writeback());
    assert!(connector.writeback_formats().is_empty());
    connector.set_writeback(fb(1, 1, 1), &OutFence::new());
    dev.commit(0, 0).unwrap();
    let k = &*out.kernel;
    let commit = k.last_commit().unwrap();
    assert_eq!(commit.value(out.connector, "WRITEBACK_FB_ID", k), None);
}

#[test]
fn crtc_commit_only_touches_attached_objects() {
    let kernel = TestKernel::new();
    let c0 = kernel.add_crtc();
    let c1 = kernel.add_crtc();
    let encoder = kernel.add_encoder(0b11);
    let conn0 = kernel.add_connector(connector_info(vec![encoder], vec![]));
    let conn1 = kernel.add_connector(connector_info(vec![encoder], vec![]));
    let p0 = kernel.add_plane(PLANE_TYPE_PRIMARY, 0b11);
    let p1 = kernel.add_plane(PLANE_TYPE_PRIMARY, 0b11);
    let p2 = kernel.add_plane(PLANE_TYPE_OVERLAY, 0b11);
    let dev = device(&kernel);
    let (k0, k1) = (dev.find_crtc(c0).unwrap(), dev.find_crtc(c1).unwrap());
    for (crtc, connector, plane) in [(k0, 0, 0), (k1, 1, 1)] {
        crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
        assert!(dev.connectors()[connector].set_crtc(Some(crtc)));
        assert!(dev.planes()[plane].set_crtc(Some(crtc)));
    }
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();

    // Move the second primary plane over to the first CRTC.
    assert!(dev.planes()[1].set_crtc(Some(k0)));
    dev.crtc_commit(k0, DRM_MODE_PAGE_FLIP_EVENT | DRM_MODE_ATOMIC_NONBLOCK, 5)
        .unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.user_data, 5);
    assert_eq!(commit.objects(), [conn0.0, c0.0, p0.0, p1.0]);
    assert!(!commit.objects().contains(&conn1.0));
    assert!(!commit.objects().contains(&p2.0));
    assert_eq!(dev.planes()[1].current().crtc_id(), c0);

    // The plane is no longer attached to the second CRTC.
    dev.crtc_commit(k1, 0, 0).unwrap();
    let commit = kernel.last_commit().unwrap();
    assert_eq!(commit.objects(), [conn1.0, c1.0]);
}

#[test]
fn legacy_configuration_is_restored_on_drop() {
    let out = single_output();
    let k = &*out.kernel;
    let legacy = DrmCrtcInfo {
        crtc_id: out.crtc,
        fb_id: DrmFb(31),
        x: 0,
        y: 0,
        mode: Some(mode(1920, 1080)),
    };
    k.legacy_crtcs.borrow_mut().insert(out.crtc, legacy.clone());
    k.set_prop(out.connector, "CRTC_ID", out.crtc.0 as u64);
    let dev = device(&out.kernel);
    assert_eq!(dev.connectors()[0].current().crtc_id(), out.crtc);
    dev.connectors()[0].set_crtc(None);
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();
    assert!(k.legacy_restores.borrow().is_empty());
    drop(dev);
    let restores = k.legacy_restores.borrow();
    assert_eq!(restores.len(), 1);
    assert_eq!(restores[0].0, legacy);
    assert_eq!(restores[0].1, [out.connector]);
}

#[test]
fn unassigned_connector_is_not_restored() {
    let out = single_output();
    drop(device(&out.kernel));
    assert!(out.kernel.legacy_restores.borrow().is_empty());
}

#[test]
fn flip_events_reach_the_handler() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = dev.crtcs()[0].clone();
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0).unwrap();

    let res = EventDispatcher::dispatch(&dev, Some(Duration::ZERO), |_| LoopAction::Continue);
    assert_eq!(res.unwrap().events, 0);

    for user_data in [1, 2, 3] {
        dev.crtc_commit(&crtc, DRM_MODE_PAGE_FLIP_EVENT, user_data)
            .unwrap();
    }
    let mut seen = vec![];
    let res = EventDispatcher::dispatch(&dev, None, |flip| {
        seen.push(flip.user_data);
        assert_eq!(flip.crtc, out.crtc);
        match flip.user_data {
            2 => LoopAction::Stop,
            _ => LoopAction::Continue,
        }
    })
    .unwrap();
    assert_eq!(res.action, LoopAction::Stop);
    assert_eq!(res.events, 2);
    assert_eq!(seen, [1, 2]);
}

#[test]
fn run_stops_when_the_handler_says_so() {
    let out = single_output();
    let dev = device(&out.kernel);
    let crtc = dev.crtcs()[0].clone();
    crtc.set_mode(Some(&mode(1920, 1080))).unwrap();
    dev.commit(DRM_MODE_PAGE_FLIP_EVENT, 0).unwrap();
    let mut flips = 0;
    EventDispatcher::run(&dev, |flip| {
        flips += 1;
        if flip.user_data < 3 {
            dev.crtc_commit(&crtc, DRM_MODE_PAGE_FLIP_EVENT, flip.user_data + 1)
                .unwrap();
            return LoopAction::Continue;
        }
        LoopAction::Stop
    })
    .unwrap();
    assert_eq!(flips, 4);
}

#[test]
fn dumb_framebuffers_are_released() {
    let out = single_output();
    let dev = device(&out.kernel);
    let fb = DumbFramebuffer::new(&dev, XRGB8888, 640, 480).unwrap();
    assert_eq!(fb.pitch(), 640 * 4);
    assert_eq!(fb.fb_ref().width, 640);
    assert_eq!(out.kernel.fbs.borrow().as_slice(), [fb.fb_ref().id]);
    assert_eq!(out.kernel.dumb_buffers.borrow().len(), 1);
    drop(fb);
    assert!(out.kernel.fbs.borrow().is_empty());
    assert!(out.kernel.dumb_buffers.borrow().is_empty());
}

#[test]
fn dumb_framebuffers_need_support() {
    static NV12: &Format = &Format {
        name: "nv12",
        drm: crate::format::fourcc_code('N', 'V', '1', '2'),
        bpp: 12,
        has_alpha: false,
    };
    let out = single_output();
    let dev = device(&out.kernel);
    assert!(matches!(
        DumbFramebuffer::new(&dev, NV12, 64, 64),
        Err(KmsError::UnsupportedDumbFormat(_))
    ));
    drop(dev);

    out.kernel.caps.borrow_mut().remove(&DRM_CAP_DUMB_BUFFER);
    let dev = device(&out.kernel);
    assert!(!dev.caps().dumb_buffers);
    assert!(matches!(
        DumbFramebuffer::new(&dev, ARGB8888, 64, 64),
        Err(KmsError::NoDumbBuffers)
    ));
}

#[test]
fn preferred_mode_falls_back_to_first() {
    let kernel = TestKernel::new();
    kernel.add_connector(connector_info(vec![], vec![mode(800, 600), mode(640, 480)]));
    kernel.add_connector(connector_info(vec![], vec![]));
    let dev = device(&kernel);
    let first = dev.connectors()[0].preferred_mode().unwrap();
    assert_eq!(first.hdisplay, 800);
    assert!(dev.connectors()[1].preferred_mode().is_none());
}
