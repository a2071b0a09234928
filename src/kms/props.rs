use {
    crate::{
        kms::KmsError,
        video::drm::{DrmInterface, DrmObject, DrmProperty, DrmPropertyType, ObjectChange},
    },
    linearize::{Linearize, LinearizeExt, StaticMap},
    std::fmt::Debug,
};


/// The fixed set of properties the pipeline uses on one kind of object.
pub trait PropertySet: Linearize + Copy + Debug + 'static {
    /// The object kind, used in error messages.
    const OBJECT: &'static str;

    fn name(self) -> &'static str;

    fn required(self) -> bool;

    fn from_name(name: &[u8]) -> Option<Self>;
}

macro_rules! property_set {
    (
        $(#[$attr:meta])*
        $ty:ident($object:literal) {
            $($variant:ident = $name:literal $(, $required:ident)?;)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, linearize::Linearize)]
        pub enum $ty {
            $($variant,)*
        }

        impl PropertySet for $ty {
            const OBJECT: &'static str = $object;

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            fn required(self) -> bool {
                match self {
                    $(Self::$variant => property_set!(@required $($required)?),)*
                }
            }

            fn from_name(name: &[u8]) -> Option<Self> {
                match name {
                    $(n if n == $name.as_bytes() => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
    (@required required) => { true };
    (@required) => { false };
}

property_set! {
    ConnectorProp("connector") {
        CrtcId = "CRTC_ID", required;
        WritebackFbId = "WRITEBACK_FB_ID";
        WritebackOutFencePtr = "WRITEBACK_OUT_FENCE_PTR";
        WritebackPixelFormats = "WRITEBACK_PIXEL_FORMATS";
    }
}

property_set! {
    CrtcProp("crtc") {
        Active = "ACTIVE", required;
        ModeId = "MODE_ID", required;
    }
}

property_set! {
    PlaneProp("plane") {
        Type = "type", required;
        FbId = "FB_ID", required;
        CrtcId = "CRTC_ID", required;
        CrtcX = "CRTC_X", required;
        CrtcY = "CRTC_Y", required;
        CrtcW = "CRTC_W", required;
        CrtcH = "CRTC_H", required;
        SrcX = "SRC_X", required;
        SrcY = "SRC_Y", required;
        SrcW = "SRC_W", required;
        SrcH = "SRC_H", required;
        Alpha = "alpha";
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedProperty {
    pub id: DrmProperty,
    /// The value at the time the object was discovered.
    pub value: u64,
    pub ty: DrmPropertyType,
}

/// The resolved properties of one object.
pub struct Properties<P: PropertySet> {
    props: StaticMap<P, Option<ResolvedProperty>>,
}

impl<P: PropertySet> Properties<P> {
    /// Maps the properties advertised by `obj` onto `P`.
    ///
    /// Advertised properties that are not part of `P` are ignored. Fails if a
    /// required property is not advertised.
    pub fn resolve<T: DrmObject>(drm: &dyn DrmInterface, obj: T) -> Result<Self, KmsError> {
        let mut props = StaticMap::<P, Option<ResolvedProperty>>::default();
        for value in drm.get_properties(obj)? {
            let def = drm.get_property(value.id)?;
            let Some(p) = P::from_name(&def.name) else {
                continue;
            };
            props[p] = Some(ResolvedProperty {
                id: def.id,
                value: value.value,
                ty: def.ty,
            });
        }
        for p in P::variants() {
            match &props[p] {
                Some(prop) => log::trace!(
                    "{} {}: {} = {} (property {})",
                    P::OBJECT,
                    obj.id(),
                    p.name(),
                    prop.value,
                    prop.id,
                ),
                None if p.required() => {
                    return Err(KmsError::MissingProperty {
                        object: P::OBJECT,
                        id: obj.id(),
                        name: p.name(),
                    });
                }
                None => log::debug!(
                    "{} {} does not support optional property {}",
                    P::OBJECT,
                    obj.id(),
                    p.name(),
                ),
            }
        }
        Ok(Self { props })
    }

    pub fn get(&self, p: P) -> Option<&ResolvedProperty> {
        self.props[p].as_ref()
    }

    pub fn has(&self, p: P) -> bool {
        self.props[p].is_some()
    }

    pub fn id(&self, p: P) -> Option<DrmProperty> {
        self.get(p).map(|p| p.id)
    }

    /// The discovered value of `p`, or 0 if the object does not have it.
    pub fn value(&self, p: P) -> u64 {
        self.get(p).map(|p| p.value).unwrap_or(0)
    }

    /// Adds a write of `p` to the change. Unsupported properties are skipped.
    pub fn write(&self, change: &mut ObjectChange, p: P, value: u64) {
        if let Some(prop) = self.get(p) {
            change.change(prop.id, value);
        }
    }
}
