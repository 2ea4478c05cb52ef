//! Authentication states.

use std::fmt;

use hdcp_core::InterruptKind;

/// HDCP 1.x states in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hdcp1State {
    WaitResChgOk,
    InitAuthentication,
    WaitR0,
    CompareR0,
    RecompareR0,
    CheckRepeater,
    WaitKsvList,
    ReadKsvList,
    CompareV,
    WaitRi,
    CheckLinkIntegrity,
    RecompareRi,
    ReDoAuthentication,
    WaitResetOk,
}

/// HDCP 2.x states in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hdcp2State {
    WaitResChgOk,
    LoadFw,
    InitialOk,
    Authentication,
    CheckAkeOk,
    CheckCertOk,
    RepeaterCheck,
    RepeaterCheckOk,
    ResetReceiver,
    RepeatMsgDone,
    AuthenCheck,
    Encryption,
}

/// The one active state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Waiting for hot-plug or start.
    #[default]
    Idle,
    Hdcp1(Hdcp1State),
    Hdcp2(Hdcp2State),
}

/// What the dispatcher does after a state handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Wait for the timer or an interrupt.
    Yield,
    /// Run the new state's handler in the same dispatch.
    Continue,
}

impl State {
    /// States that only advance on the Ri interrupt.
    pub fn ignores_ticks(&self) -> bool {
        matches!(
            self,
            State::Hdcp1(Hdcp1State::WaitRi) | State::Hdcp1(Hdcp1State::CheckLinkIntegrity)
        )
    }

    /// Whether `kind` can complete what this state is waiting for.
    pub fn awaits(&self, kind: InterruptKind) -> bool {
        use InterruptKind::*;
        match self {
            State::Idle => false,
            State::Hdcp1(s) => matches!(
                (s, kind),
                (Hdcp1State::WaitRi, RiReady)
                    | (Hdcp1State::CheckLinkIntegrity, RiReady)
                    | (Hdcp1State::CompareV, VReady)
            ),
            State::Hdcp2(s) => matches!(
                (s, kind),
                (Hdcp2State::InitialOk, CodeCheckDone)
                    | (Hdcp2State::CheckAkeOk, AkeSent)
                    | (Hdcp2State::CheckCertOk, CertReceived)
                    | (
                        Hdcp2State::RepeaterCheckOk,
                        ReceiverIdChanged | StreamManageDone | AuthDone
                    )
                    | (Hdcp2State::RepeatMsgDone, StreamManageDone | AuthDone)
                    | (Hdcp2State::AuthenCheck, AuthDone | AuthFail)
            ),
        }
    }

    pub fn is_hdcp2(&self) -> bool {
        matches!(self, State::Hdcp2(_))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::Hdcp1(s) => write!(f, "Hdcp1::{:?}", s),
            State::Hdcp2(s) => write!(f, "Hdcp2::{:?}", s),
        }
    }
}
