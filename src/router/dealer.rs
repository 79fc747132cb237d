use std::time::Duration;

use battler_wamp_uri::Uri;
use tokio::time::Instant;

use crate::core::{
    cancel::CallCancelMode,
    hash::HashMap,
    id::Id,
};

/// A single procedure registration, owned by exactly one callee.
///
/// The spec supports only a single registration per procedure URI: a second `REGISTER` for an
/// already-registered procedure is rejected with [`InteractionError::ProcedureAlreadyExists`]
/// rather than being pooled behind a shared-registration invocation policy.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: Id,
    pub procedure: Uri,
    pub callee: Id,
}

/// A single in-flight invocation, correlating the caller's `CALL` with the callee's `INVOCATION`.
///
/// The dealer generates its own invocation ID (global scope, drawn from the realm's invocation
/// allocator) distinct from the caller's request ID, so that the `InvocationTable` is a bijection
/// between `(caller, call request)` and `(callee, invocation request)`.
#[derive(Debug, Clone)]
struct Invocation {
    caller: Id,
    caller_request: Id,
    callee: Id,
    #[allow(dead_code)]
    registration: Id,
    deadline: Option<Instant>,
    /// Set once a `YIELD`/`ERROR` from the callee should no longer reach the caller: the caller
    /// was already completed by a `skip`/`killNoWait` cancel or a deadline expiry.
    discard_result_or_error: bool,
    /// Set once `INTERRUPT` has been sent to the callee for this job, so a deadline firing after
    /// an explicit `kill`/`killNoWait` cancel (or vice versa) never sends a second one.
    interruption_sent: bool,
}

/// What the router should do in response to a caller's `CANCEL`, resolved against the registry's
/// knowledge of whether the callee supports `INTERRUPT`.
pub struct CancelOutcome {
    pub callee: Id,
    pub invocation_id: Id,
    /// The mode actually applied, after downgrading to [`CallCancelMode::Skip`] if the callee
    /// does not advertise cancellation support.
    pub mode: CallCancelMode,
    /// Whether an `INTERRUPT` should be sent to the callee (false if one was already sent, or if
    /// `mode` downgraded to `skip`).
    pub send_interrupt: bool,
    /// Whether the caller should be completed with `wamp.error.canceled` right away, rather than
    /// waiting for the callee's eventual `RESULT`/`ERROR`.
    pub complete_caller_now: bool,
}

/// The outcome of a callee's `YIELD`/`ERROR` resolving against the `InvocationTable`.
pub enum InvocationCompletion {
    /// Deliver the result/error to the caller with its original call request ID.
    Deliver { caller: Id, caller_request: Id },
    /// The job was already completed from the caller's side (by cancel or deadline); the
    /// callee's reply arrived too late and must be dropped without reaching the caller.
    Discarded,
}

/// What happened to a session's in-flight invocations when it was removed from the realm.
#[derive(Default)]
pub struct RemovedSessionInvocations {
    /// `(caller, caller_request)` pairs to notify with `wamp.error.canceled` because their callee
    /// just left the realm.
    pub notify_caller: Vec<(Id, Id)>,
    /// `(callee, invocation_id)` pairs to `INTERRUPT` (if the callee supports cancellation)
    /// because their caller just left the realm.
    pub notify_callee: Vec<(Id, Id)>,
}

/// A deadline-driven cancellation, produced when the dealer's armed timer fires.
pub struct DeadlineExpiry {
    pub caller: Id,
    pub caller_request: Id,
    pub callee: Id,
    pub invocation_id: Id,
    pub send_interrupt: bool,
}

/// The RPC routing core for a single realm.
///
/// Tracks procedure registrations (one callee per URI) and in-flight invocations, correlating
/// caller-side `CALL`/`CANCEL`/`RESULT` traffic with callee-side `INVOCATION`/`INTERRUPT`/`YIELD`
/// traffic through the `InvocationTable`. A single timer is conceptually armed to the
/// earliest-expiring invocation's deadline; [`Self::next_deadline`]/[`Self::fire_deadline`] let the
/// realm's own scheduling loop drive that timer without the dealer depending on an executor.
#[derive(Default)]
pub struct Dealer {
    registrations: HashMap<Uri, Registration>,
    registration_locations: HashMap<Id, Uri>,
    callee_registrations: HashMap<Id, Vec<Id>>,

    invocations_by_caller: HashMap<(Id, Id), Id>,
    invocations_by_invocation_id: HashMap<Id, Invocation>,

    armed_deadline: Option<Instant>,
}

impl Dealer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `procedure` to `callee`, failing if it is already registered.
    pub fn register(
        &mut self,
        callee: Id,
        procedure: Uri,
        id: Id,
    ) -> Result<Id, crate::core::error::InteractionError> {
        if self.registrations.contains_key(&procedure) {
            return Err(crate::core::error::InteractionError::ProcedureAlreadyExists);
        }
        self.registrations.insert(
            procedure.clone(),
            Registration {
                id,
                procedure: procedure.clone(),
                callee,
            },
        );
        self.registration_locations.insert(id, procedure);
        self.callee_registrations.entry(callee).or_default().push(id);
        Ok(id)
    }

    /// Unregisters the registration identified by `id`, owned by `callee`.
    ///
    /// Pending invocations of the procedure are not interrupted; they are allowed to complete, per
    /// the dealer's explicit design decision to let in-flight calls run to completion after their
    /// procedure is unregistered.
    pub fn unregister(
        &mut self,
        callee: Id,
        id: Id,
    ) -> Result<Uri, crate::core::error::InteractionError> {
        let procedure = self
            .registration_locations
            .get(&id)
            .cloned()
            .ok_or(crate::core::error::InteractionError::NoSuchRegistration)?;
        let registration = self
            .registrations
            .get(&procedure)
            .ok_or(crate::core::error::InteractionError::NoSuchRegistration)?;
        if registration.callee != callee {
            return Err(crate::core::error::InteractionError::NoSuchRegistration);
        }
        self.registrations.remove(&procedure);
        self.registration_locations.remove(&id);
        if let Some(owned) = self.callee_registrations.get_mut(&callee) {
            owned.retain(|owned_id| *owned_id != id);
        }
        Ok(procedure)
    }

    /// Looks up the registration backing `procedure`, if any.
    pub fn registration_for(&self, procedure: &Uri) -> Option<&Registration> {
        self.registrations.get(procedure)
    }

    /// Looks up the callee of the invocation matching a caller's `CANCEL`, without mutating
    /// anything. Used to resolve the callee's advertised cancellation support before calling
    /// [`Self::cancel`].
    pub fn callee_for_caller_request(&self, caller: Id, caller_request: Id) -> Option<Id> {
        let invocation_id = *self.invocations_by_caller.get(&(caller, caller_request))?;
        self.invocations_by_invocation_id
            .get(&invocation_id)
            .map(|invocation| invocation.callee)
    }

    /// Begins an invocation of `registration` on behalf of `caller`, returning the invocation ID
    /// to send in the `INVOCATION` message.
    ///
    /// `timeout` is the dealer-side deadline requested by the `CALL` (the WAMP `timeout` option,
    /// in milliseconds); a zero or absent timeout arms no deadline.
    pub fn invoke(
        &mut self,
        caller: Id,
        caller_request: Id,
        registration: &Registration,
        invocation_id: Id,
        timeout: Option<Duration>,
    ) -> Id {
        let deadline = timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| Instant::now() + timeout);
        self.invocations_by_caller
            .insert((caller, caller_request), invocation_id);
        self.invocations_by_invocation_id.insert(
            invocation_id,
            Invocation {
                caller,
                caller_request,
                callee: registration.callee,
                registration: registration.id,
                deadline,
                discard_result_or_error: false,
                interruption_sent: false,
            },
        );
        if let Some(deadline) = deadline {
            let armed_earlier = self
                .armed_deadline
                .is_some_and(|armed| armed <= deadline);
            if !armed_earlier {
                self.armed_deadline = Some(deadline);
            }
        }
        invocation_id
    }

    /// Resolves the invocation matching a caller's `CANCEL`, applying `requested_mode`
    /// (downgraded to [`CallCancelMode::Skip`] if `callee_supports_cancellation` is false) and
    /// returning what the router should do. Returns `None` if no such invocation is outstanding
    /// (an unknown-request `CANCEL` is not a protocol error; it is simply ignored).
    pub fn cancel(
        &mut self,
        caller: Id,
        caller_request: Id,
        requested_mode: CallCancelMode,
        callee_supports_cancellation: bool,
    ) -> Option<CancelOutcome> {
        let invocation_id = *self.invocations_by_caller.get(&(caller, caller_request))?;
        let invocation = self.invocations_by_invocation_id.get_mut(&invocation_id)?;

        let mode = if callee_supports_cancellation {
            requested_mode
        } else {
            CallCancelMode::Skip
        };

        let send_interrupt = mode != CallCancelMode::Skip && !invocation.interruption_sent;
        if send_interrupt {
            invocation.interruption_sent = true;
        }
        let complete_caller_now = mode != CallCancelMode::Kill;
        if complete_caller_now {
            invocation.discard_result_or_error = true;
        }
        let callee = invocation.callee;

        if mode == CallCancelMode::KillNoWait {
            self.erase_invocation(invocation_id);
        }

        Some(CancelOutcome {
            callee,
            invocation_id,
            mode,
            send_interrupt,
            complete_caller_now,
        })
    }

    /// Completes the invocation identified by a callee's `YIELD`/`ERROR`. Returns `None` if the
    /// invocation is unknown or belongs to a different callee (a late reply for a job the dealer
    /// already erased by cancel, deadline, or session departure); the caller's `handle_message`
    /// must treat that as a silent drop, not a protocol violation.
    pub fn complete_invocation(
        &mut self,
        callee: Id,
        invocation_request: Id,
    ) -> Option<InvocationCompletion> {
        let invocation = self.invocations_by_invocation_id.get(&invocation_request)?;
        if invocation.callee != callee {
            return None;
        }
        let discard = invocation.discard_result_or_error;
        let (caller, caller_request) = (invocation.caller, invocation.caller_request);
        self.erase_invocation(invocation_request);
        Some(if discard {
            InvocationCompletion::Discarded
        } else {
            InvocationCompletion::Deliver {
                caller,
                caller_request,
            }
        })
    }

    /// The earliest deadline still armed across all in-flight invocations, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed_deadline
    }

    /// Fires the currently-armed deadline (if `now` has reached it), canceling the affected
    /// invocation with `killNoWait` semantics and re-arming the timer to the next-earliest
    /// deadline. Returns `None` if no deadline is armed or `now` has not yet reached it.
    pub fn fire_deadline(&mut self, now: Instant) -> Option<DeadlineExpiry> {
        let armed = self.armed_deadline?;
        if now < armed {
            return None;
        }
        let invocation_id = *self
            .invocations_by_invocation_id
            .iter()
            .find(|(_, invocation)| invocation.deadline == Some(armed))
            .map(|(id, _)| id)?;
        let invocation = self.invocations_by_invocation_id.get_mut(&invocation_id)?;
        let send_interrupt = !invocation.interruption_sent;
        invocation.interruption_sent = true;
        let (caller, caller_request, callee) =
            (invocation.caller, invocation.caller_request, invocation.callee);
        self.erase_invocation(invocation_id);
        Some(DeadlineExpiry {
            caller,
            caller_request,
            callee,
            invocation_id,
            send_interrupt,
        })
    }

    /// Removes every registration and in-flight invocation touching `session`, e.g. on session
    /// departure. A session that is simultaneously the caller and the callee of the same job
    /// (a self-call) is erased without either notification, matching the behavior of an ordinary
    /// completed call: destroying the job IS the notification.
    pub fn remove_session(&mut self, session: Id) -> RemovedSessionInvocations {
        if let Some(registration_ids) = self.callee_registrations.remove(&session) {
            for id in registration_ids {
                if let Some(procedure) = self.registration_locations.remove(&id) {
                    self.registrations.remove(&procedure);
                }
            }
        }

        let mut removed = RemovedSessionInvocations::default();
        let invocation_ids: Vec<Id> = self.invocations_by_invocation_id.keys().copied().collect();
        for invocation_id in invocation_ids {
            let Some(invocation) = self.invocations_by_invocation_id.get(&invocation_id) else {
                continue;
            };
            let is_caller = invocation.caller == session;
            let is_callee = invocation.callee == session;
            if !is_caller && !is_callee {
                continue;
            }
            if is_callee && !is_caller && !invocation.discard_result_or_error {
                removed
                    .notify_caller
                    .push((invocation.caller, invocation.caller_request));
            }
            if is_caller && !is_callee && !invocation.interruption_sent {
                removed.notify_callee.push((invocation.callee, invocation_id));
            }
            self.erase_invocation(invocation_id);
        }
        removed
    }

    /// Removes an invocation from both indices, re-arming the deadline timer if the erased
    /// invocation was the one the timer was armed to.
    ///
    /// Re-arming walks every outstanding invocation with a linear scan. Acceptable for the small
    /// invocation counts expected in practice; a heap-backed priority queue would be the natural
    /// upgrade if profiling ever shows this as a hotspot.
    fn erase_invocation(&mut self, invocation_id: Id) {
        let Some(invocation) = self.invocations_by_invocation_id.remove(&invocation_id) else {
            return;
        };
        self.invocations_by_caller
            .remove(&(invocation.caller, invocation.caller_request));
        if invocation.deadline.is_some() && invocation.deadline == self.armed_deadline {
            self.armed_deadline = self
                .invocations_by_invocation_id
                .values()
                .filter_map(|invocation| invocation.deadline)
                .min();
        }
    }

    /// Abandons an invocation that was never delivered to its callee (the `INVOCATION` message
    /// failed to send). Erases it the same way [`Self::erase_invocation`] would, without any of
    /// the completion/cancellation notifications those paths send, since neither side observed
    /// this invocation ever existing.
    ///
    /// Callers must invoke this when delivery fails right after [`Self::invoke`], so the job
    /// doesn't linger in the tables forever (or get double-completed later by the deadline
    /// sweep) after its `INVOCATION` never reached the callee.
    pub fn abandon_invocation(&mut self, invocation_id: Id) {
        self.erase_invocation(invocation_id);
    }
}

#[cfg(test)]
mod dealer_test {
    use std::time::Duration;

    use battler_wamp_uri::Uri;
    use tokio::time::Instant;

    use super::{
        Dealer,
        InvocationCompletion,
    };
    use crate::core::{
        cancel::CallCancelMode,
        id::Id,
    };

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn procedure(raw: &str) -> Uri {
        Uri::try_from(raw).unwrap()
    }

    #[test]
    fn second_registration_of_same_procedure_is_rejected() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        assert!(dealer
            .register(id(2), procedure("com.example.proc"), id(101))
            .is_err());
    }

    #[test]
    fn invoke_and_complete_round_trip() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        let registration = dealer.registration_for(&procedure("com.example.proc")).unwrap().clone();

        let invocation_id = dealer.invoke(id(2), id(5), &registration, id(200), None);
        assert_eq!(invocation_id, id(200));

        match dealer.complete_invocation(id(1), id(200)).unwrap() {
            InvocationCompletion::Deliver {
                caller,
                caller_request,
            } => {
                assert_eq!(caller, id(2));
                assert_eq!(caller_request, id(5));
            }
            InvocationCompletion::Discarded => panic!("expected a delivery, not a discard"),
        }

        assert!(dealer.complete_invocation(id(1), id(200)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn callee_departure_orphans_in_flight_calls() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        let registration = dealer.registration_for(&procedure("com.example.proc")).unwrap().clone();
        dealer.invoke(id(2), id(5), &registration, id(200), None);

        let removed = dealer.remove_session(id(1));
        assert_eq!(removed.notify_caller, vec![(id(2), id(5))]);
        assert!(removed.notify_callee.is_empty());
        assert!(dealer.registration_for(&procedure("com.example.proc")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn caller_departure_notifies_callee_for_interrupt() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        let registration = dealer.registration_for(&procedure("com.example.proc")).unwrap().clone();
        dealer.invoke(id(2), id(5), &registration, id(200), None);

        let removed = dealer.remove_session(id(2));
        assert!(removed.notify_caller.is_empty());
        assert_eq!(removed.notify_callee, vec![(id(1), id(200))]);
    }

    #[tokio::test(start_paused = true)]
    async fn self_call_departure_notifies_neither_side() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        let registration = dealer.registration_for(&procedure("com.example.proc")).unwrap().clone();
        dealer.invoke(id(1), id(5), &registration, id(200), None);

        let removed = dealer.remove_session(id(1));
        assert!(removed.notify_caller.is_empty());
        assert!(removed.notify_callee.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn kill_no_wait_completes_caller_immediately_and_drops_late_yield() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        let registration = dealer.registration_for(&procedure("com.example.proc")).unwrap().clone();
        dealer.invoke(id(2), id(5), &registration, id(200), None);

        let outcome = dealer
            .cancel(id(2), id(5), CallCancelMode::KillNoWait, true)
            .unwrap();
        assert_eq!(outcome.callee, id(1));
        assert_eq!(outcome.invocation_id, id(200));
        assert!(outcome.send_interrupt);
        assert!(outcome.complete_caller_now);

        // The job is erased immediately on `killNoWait`; a late `YIELD` finds nothing to discard.
        assert!(dealer.complete_invocation(id(1), id(200)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_completes_caller_but_keeps_job_for_late_yield_discard() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        let registration = dealer.registration_for(&procedure("com.example.proc")).unwrap().clone();
        dealer.invoke(id(2), id(5), &registration, id(200), None);

        let outcome = dealer.cancel(id(2), id(5), CallCancelMode::Skip, true).unwrap();
        assert!(!outcome.send_interrupt);
        assert!(outcome.complete_caller_now);

        match dealer.complete_invocation(id(1), id(200)).unwrap() {
            InvocationCompletion::Discarded => {}
            InvocationCompletion::Deliver { .. } => panic!("expected a discard"),
        }
    }

    #[test]
    fn cancel_downgrades_to_skip_when_callee_lacks_support() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.proc"), id(100))
            .unwrap();
        let registration = dealer.registration_for(&procedure("com.example.proc")).unwrap().clone();
        dealer.invoke(id(2), id(5), &registration, id(200), None);

        let outcome = dealer
            .cancel(id(2), id(5), CallCancelMode::Kill, false)
            .unwrap();
        assert_eq!(outcome.mode, CallCancelMode::Skip);
        assert!(!outcome.send_interrupt);
        assert!(outcome.complete_caller_now);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_killnowait_and_rearms_to_next_earliest() {
        let mut dealer = Dealer::new();
        dealer
            .register(id(1), procedure("com.example.a"), id(100))
            .unwrap();
        dealer
            .register(id(2), procedure("com.example.b"), id(101))
            .unwrap();
        let reg_a = dealer.registration_for(&procedure("com.example.a")).unwrap().clone();
        let reg_b = dealer.registration_for(&procedure("com.example.b")).unwrap().clone();

        dealer.invoke(id(3), id(5), &reg_a, id(200), Some(Duration::from_millis(10)));
        dealer.invoke(id(3), id(6), &reg_b, id(201), Some(Duration::from_millis(50)));

        let first_deadline = dealer.next_deadline().unwrap();

        tokio::time::advance(Duration::from_millis(20)).await;
        let expiry = dealer.fire_deadline(Instant::now()).unwrap();
        assert_eq!(expiry.caller, id(3));
        assert_eq!(expiry.caller_request, id(5));
        assert_eq!(expiry.callee, id(1));
        assert!(expiry.send_interrupt);

        // The timer is now armed to the second invocation's (later) deadline.
        assert!(dealer.next_deadline().is_some());
        assert_ne!(dealer.next_deadline().unwrap(), first_deadline);
    }

    #[test]
    fn unknown_cancel_request_is_ignored() {
        let mut dealer = Dealer::new();
        assert!(dealer.cancel(id(9), id(9), CallCancelMode::Skip, true).is_none());
    }
}
