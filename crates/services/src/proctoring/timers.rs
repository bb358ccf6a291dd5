use chrono::{DateTime, Utc};

use super::effects::NoticeId;

/// Pending deadlines of a session.
///
/// Nothing here runs on its own: the session checks the deadlines against the
/// `now` of each incoming signal and fires whatever is due.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Timers {
    face_grace: Option<DateTime<Utc>>,
    notice_dismiss: Option<(NoticeId, DateTime<Utc>)>,
    auto_submit: Option<DateTime<Utc>>,
}

impl Timers {
    pub(crate) fn arm_face_grace(&mut self, deadline: DateTime<Utc>) {
        self.face_grace = Some(deadline);
    }

    pub(crate) fn cancel_face_grace(&mut self) {
        self.face_grace = None;
    }

    pub(crate) fn face_grace_armed(&self) -> bool {
        self.face_grace.is_some()
    }

    pub(crate) fn arm_notice_dismiss(&mut self, id: NoticeId, deadline: DateTime<Utc>) {
        self.notice_dismiss = Some((id, deadline));
    }

    pub(crate) fn cancel_notice_dismiss(&mut self) {
        self.notice_dismiss = None;
    }

    pub(crate) fn arm_auto_submit(&mut self, deadline: DateTime<Utc>) {
        self.auto_submit = Some(deadline);
    }

    pub(crate) fn auto_submit_armed(&self) -> bool {
        self.auto_submit.is_some()
    }

    /// Disarms and returns the earliest deadline at or before `now`.
    ///
    /// Deadlines sharing an instant come out as grace, then notice dismiss,
    /// then auto-submit.
    pub(crate) fn take_next_due(&mut self, now: DateTime<Utc>) -> Option<Due> {
        let (deadline, slot) = [
            self.face_grace.map(|at| (at, Slot::FaceGrace)),
            self.notice_dismiss.map(|(_, at)| (at, Slot::NoticeDismiss)),
            self.auto_submit.map(|at| (at, Slot::AutoSubmit)),
        ]
        .into_iter()
        .flatten()
        .filter(|(at, _)| *at <= now)
        .min()?;

        match slot {
            Slot::FaceGrace => {
                self.face_grace = None;
                Some(Due::FaceGrace(deadline))
            }
            Slot::NoticeDismiss => self
                .notice_dismiss
                .take()
                .map(|(id, _)| Due::NoticeDismiss(id)),
            Slot::AutoSubmit => {
                self.auto_submit = None;
                Some(Due::AutoSubmit(deadline))
            }
        }
    }

    /// Earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<DateTime<Utc>> {
        [
            self.face_grace,
            self.notice_dismiss.map(|(_, at)| at),
            self.auto_submit,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A deadline that came due, carrying what firing it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Due {
    FaceGrace(DateTime<Utc>),
    NoticeDismiss(NoticeId),
    AutoSubmit(DateTime<Utc>),
}

// Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    FaceGrace,
    NoticeDismiss,
    AutoSubmit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proctor_core::time::fixed_now;

    #[test]
    fn deadlines_fire_only_when_due() {
        let now = fixed_now();
        let mut timers = Timers::default();
        timers.arm_face_grace(now + Duration::seconds(5));

        assert_eq!(timers.take_next_due(now + Duration::seconds(4)), None);
        assert!(timers.face_grace_armed());
        assert_eq!(
            timers.take_next_due(now + Duration::seconds(5)),
            Some(Due::FaceGrace(now + Duration::seconds(5)))
        );
        assert!(!timers.face_grace_armed());
        assert_eq!(timers.take_next_due(now + Duration::seconds(60)), None);
    }

    #[test]
    fn overdue_deadlines_come_out_in_time_order() {
        let now = fixed_now();
        let mut timers = Timers::default();
        timers.arm_face_grace(now + Duration::seconds(7));
        timers.arm_notice_dismiss(NoticeId::new(2), now + Duration::seconds(5));
        timers.arm_auto_submit(now + Duration::seconds(5));

        let late = now + Duration::seconds(10);
        assert_eq!(
            timers.take_next_due(late),
            Some(Due::NoticeDismiss(NoticeId::new(2)))
        );
        assert_eq!(
            timers.take_next_due(late),
            Some(Due::AutoSubmit(now + Duration::seconds(5)))
        );
        assert_eq!(
            timers.take_next_due(late),
            Some(Due::FaceGrace(now + Duration::seconds(7)))
        );
        assert_eq!(timers.take_next_due(late), None);
    }

    #[test]
    fn ties_fire_grace_first() {
        let now = fixed_now();
        let mut timers = Timers::default();
        timers.arm_auto_submit(now);
        timers.arm_face_grace(now);

        assert_eq!(timers.take_next_due(now), Some(Due::FaceGrace(now)));
        assert_eq!(timers.take_next_due(now), Some(Due::AutoSubmit(now)));
    }

    #[test]
    fn next_deadline_is_the_earliest() {
        let now = fixed_now();
        let mut timers = Timers::default();
        assert_eq!(timers.next_deadline(), None);

        timers.arm_face_grace(now + Duration::seconds(5));
        timers.arm_notice_dismiss(NoticeId::new(1), now + Duration::seconds(2));
        timers.arm_auto_submit(now + Duration::seconds(3));
        assert_eq!(timers.next_deadline(), Some(now + Duration::seconds(2)));

        assert_eq!(
            timers.take_next_due(now + Duration::seconds(2)),
            Some(Due::NoticeDismiss(NoticeId::new(1)))
        );
        assert_eq!(timers.next_deadline(), Some(now + Duration::seconds(3)));

        timers.clear();
        assert_eq!(timers.next_deadline(), None);
        assert!(!timers.auto_submit_armed());
    }
}
