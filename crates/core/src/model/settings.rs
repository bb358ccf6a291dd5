use thiserror::Error;

/// Violation count at which an attempt is force-submitted.
pub const MAX_WARNINGS: u32 = 3;

/// Time limit used when a test does not set one (one hour).
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 3600;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("default time limit must be > 0")]
    InvalidDefaultTimeLimit,

    #[error("face grace period must be between 0 and 60 seconds")]
    InvalidFaceGrace,

    #[error("max warnings must be > 0")]
    InvalidMaxWarnings,

    #[error("notice duration must be between 1 and 60 seconds")]
    InvalidNoticeDuration,

    #[error("auto-submit delay must be between 0 and 60 seconds")]
    InvalidAutoSubmitDelay,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Proctoring policy for one attempt.
///
/// Controls the face-loss grace window, the escalation threshold and how
/// warning notices behave.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProctorSettings {
    default_time_limit_secs: u32,
    face_grace_secs: u32,
    max_warnings: u32,
    notice_secs: u32,
    auto_submit_delay_secs: u32,
    require_acknowledgment: bool,
    strict: bool,
    repeat_face_violations: bool,
    penalize_fullscreen_refusal: bool,
}

impl ProctorSettings {
    /// Defaults for the pixel-based face detector:
    /// - 5 second face grace (the detector is noisy)
    /// - 3 warnings before auto-submit
    /// - notices auto-dismiss after 2 seconds
    /// - auto-submit 2 seconds after the final notice
    #[must_use]
    pub fn standard() -> Self {
        Self {
            default_time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            face_grace_secs: 5,
            max_warnings: MAX_WARNINGS,
            notice_secs: 2,
            auto_submit_delay_secs: 2,
            require_acknowledgment: false,
            strict: false,
            repeat_face_violations: false,
            penalize_fullscreen_refusal: false,
        }
    }

    /// Defaults for the landmark model, which is reliable enough for a 1 second grace.
    #[must_use]
    pub fn landmark_model() -> Self {
        Self {
            face_grace_secs: 1,
            ..Self::standard()
        }
    }

    /// Creates custom proctoring settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if any value is outside its allowed range.
    #[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
    pub fn new(
        default_time_limit_secs: u32,
        face_grace_secs: u32,
        max_warnings: u32,
        notice_secs: u32,
        auto_submit_delay_secs: u32,
        require_acknowledgment: bool,
        strict: bool,
        repeat_face_violations: bool,
        penalize_fullscreen_refusal: bool,
    ) -> Result<Self, SettingsError> {
        if default_time_limit_secs == 0 {
            return Err(SettingsError::InvalidDefaultTimeLimit);
        }
        if face_grace_secs > 60 {
            return Err(SettingsError::InvalidFaceGrace);
        }
        if max_warnings == 0 {
            return Err(SettingsError::InvalidMaxWarnings);
        }
        if !(1..=60).contains(&notice_secs) {
            return Err(SettingsError::InvalidNoticeDuration);
        }
        if auto_submit_delay_secs > 60 {
            return Err(SettingsError::InvalidAutoSubmitDelay);
        }

        Ok(Self {
            default_time_limit_secs,
            face_grace_secs,
            max_warnings,
            notice_secs,
            auto_submit_delay_secs,
            require_acknowledgment,
            strict,
            repeat_face_violations,
            penalize_fullscreen_refusal,
        })
    }

    #[must_use]
    pub fn default_time_limit_secs(&self) -> u32 {
        self.default_time_limit_secs
    }

    #[must_use]
    pub fn face_grace_secs(&self) -> u32 {
        self.face_grace_secs
    }

    #[must_use]
    pub fn max_warnings(&self) -> u32 {
        self.max_warnings
    }

    #[must_use]
    pub fn notice_secs(&self) -> u32 {
        self.notice_secs
    }

    #[must_use]
    pub fn auto_submit_delay_secs(&self) -> u32 {
        self.auto_submit_delay_secs
    }

    /// When true, warning notices stay up until acknowledged.
    #[must_use]
    pub fn require_acknowledgment(&self) -> bool {
        self.require_acknowledgment
    }

    /// When true, user operations in the wrong phase return errors instead of no-ops.
    #[must_use]
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// When true, a face-loss episode that outlasts the grace window re-arms it.
    #[must_use]
    pub fn repeat_face_violations(&self) -> bool {
        self.repeat_face_violations
    }

    #[must_use]
    pub fn penalize_fullscreen_refusal(&self) -> bool {
        self.penalize_fullscreen_refusal
    }

    #[must_use]
    pub fn with_face_grace_secs(mut self, secs: u32) -> Self {
        self.face_grace_secs = secs.min(60);
        self
    }

    #[must_use]
    pub fn with_max_warnings(mut self, max: u32) -> Self {
        self.max_warnings = max.max(1);
        self
    }

    #[must_use]
    pub fn with_auto_submit_delay_secs(mut self, secs: u32) -> Self {
        self.auto_submit_delay_secs = secs.min(60);
        self
    }

    #[must_use]
    pub fn with_require_acknowledgment(mut self, required: bool) -> Self {
        self.require_acknowledgment = required;
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn with_repeat_face_violations(mut self, repeat: bool) -> Self {
        self.repeat_face_violations = repeat;
        self
    }

    #[must_use]
    pub fn with_penalize_fullscreen_refusal(mut self, penalize: bool) -> Self {
        self.penalize_fullscreen_refusal = penalize;
        self
    }
}

impl Default for ProctorSettings {
    fn default() -> Self {
        Self::standard()
    }
}
