//! [`KeyStore`] over a [`SecureChannel`].

use hdcp_core::{KeyStoreError, Ksv};
use tracing::{debug, warn};

use crate::command::{Command, RpcResponse};
use crate::traits::{KeyStore, SecureChannel};

/// Tracks the session state of a secure channel and maps command replies
/// onto [`KeyStoreError`].
pub struct KeyStoreGateway<C: SecureChannel> {
    channel: C,
    open: bool,
}

impl<C: SecureChannel> KeyStoreGateway<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            open: false,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn call(&mut self, command: Command, p0: u32, p1: u32) -> Result<RpcResponse, KeyStoreError> {
        if !self.open {
            return Err(KeyStoreError::SessionClosed);
        }
        let response = self.channel.invoke(command, p0, p1)?;
        if !response.is_ok() {
            warn!("Key-store {} failed: status 0x{:08x}", command, response.status);
            return Err(KeyStoreError::CallFailed {
                command: command.name(),
                status: response.status,
            });
        }
        Ok(response)
    }
}

impl<C: SecureChannel> KeyStore for KeyStoreGateway<C> {
    fn open_session(&mut self) -> Result<(), KeyStoreError> {
        if self.open {
            return Err(KeyStoreError::SessionAlreadyOpen);
        }
        self.channel.open()?;
        self.open = true;
        debug!("Key-store session opened");
        Ok(())
    }

    fn close_session(&mut self) -> Result<(), KeyStoreError> {
        if !self.open {
            return Err(KeyStoreError::SessionClosed);
        }
        self.channel.close();
        self.open = false;
        debug!("Key-store session closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write_protected_register(&mut self, addr: u32, value: u32) -> Result<(), KeyStoreError> {
        self.call(Command::WriteRegister, addr, value).map(|_| ())
    }

    fn write_reset_control(&mut self, value: u32, mask: u32) -> Result<(), KeyStoreError> {
        self.call(Command::WriteReset, value, mask).map(|_| ())
    }

    fn get_own_public_key(&mut self) -> Result<Ksv, KeyStoreError> {
        let response = self.call(Command::GetAksv, 0, 0)?;
        let bytes = response
            .payload
            .ok_or(KeyStoreError::InvalidPayload(Command::GetAksv.name()))?;
        Ok(Ksv::new(bytes))
    }

    fn load_key_material(&mut self) -> Result<(), KeyStoreError> {
        self.call(Command::LoadKey, 0, 0).map(|_| ())
    }

    fn load_firmware(&mut self) -> Result<(), KeyStoreError> {
        self.call(Command::LoadFirmware, 0, 0).map(|_| ())
    }

    fn reset_firmware(&mut self) -> Result<(), KeyStoreError> {
        self.call(Command::ResetFirmware, 0, 0).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protected;
    use crate::traits::MockSecureChannel;
    use mockall::predicate::eq;

    fn opened(mut channel: MockSecureChannel) -> KeyStoreGateway<MockSecureChannel> {
        channel.expect_open().times(1).returning(|| Ok(()));
        let mut gateway = KeyStoreGateway::new(channel);
        gateway.open_session().unwrap();
        gateway
    }

    mod session {
        use super::*;

        #[test]
        fn calls_on_closed_session_fail() {
            let mut channel = MockSecureChannel::new();
            channel.expect_invoke().never();
            let mut gateway = KeyStoreGateway::new(channel);

            assert!(!gateway.is_open());
            assert_eq!(gateway.load_key_material(), Err(KeyStoreError::SessionClosed));
            assert_eq!(gateway.get_own_public_key(), Err(KeyStoreError::SessionClosed));
            assert_eq!(gateway.close_session(), Err(KeyStoreError::SessionClosed));
        }

        #[test]
        fn open_twice_fails() {
            let mut gateway = opened(MockSecureChannel::new());
            assert_eq!(gateway.open_session(), Err(KeyStoreError::SessionAlreadyOpen));
        }

        #[test]
        fn open_failure_leaves_session_closed() {
            let mut channel = MockSecureChannel::new();
            channel
                .expect_open()
                .returning(|| Err(KeyStoreError::Channel("no trusted app".into())));
            let mut gateway = KeyStoreGateway::new(channel);
            assert!(gateway.open_session().is_err());
            assert!(!gateway.is_open());
        }

        #[test]
        fn close_then_calls_fail() {
            let mut channel = MockSecureChannel::new();
            channel.expect_close().times(1).return_const(());
            let mut gateway = opened(channel);
            gateway.close_session().unwrap();
            assert_eq!(gateway.reset_firmware(), Err(KeyStoreError::SessionClosed));
        }
    }

    mod commands {
        use super::*;

        #[test]
        fn get_aksv_returns_payload() {
            let mut channel = MockSecureChannel::new();
            channel
                .expect_invoke()
                .with(eq(Command::GetAksv), eq(0), eq(0))
                .returning(|_, _, _| Ok(RpcResponse::with_payload([1, 2, 3, 4, 5])));
            let mut gateway = opened(channel);
            assert_eq!(gateway.get_own_public_key(), Ok(Ksv::new([1, 2, 3, 4, 5])));
        }

        #[test]
        fn get_aksv_without_payload_is_invalid() {
            let mut channel = MockSecureChannel::new();
            channel
                .expect_invoke()
                .returning(|_, _, _| Ok(RpcResponse::ok()));
            let mut gateway = opened(channel);
            assert_eq!(
                gateway.get_own_public_key(),
                Err(KeyStoreError::InvalidPayload("get-aksv"))
            );
        }

        #[test]
        fn nonzero_status_maps_to_call_failed() {
            let mut channel = MockSecureChannel::new();
            channel
                .expect_invoke()
                .with(eq(Command::LoadKey), eq(0), eq(0))
                .returning(|_, _, _| Ok(RpcResponse::failed(0xffff_000c)));
            let mut gateway = opened(channel);
            assert_eq!(
                gateway.load_key_material(),
                Err(KeyStoreError::CallFailed {
                    command: "load-key",
                    status: 0xffff_000c
                })
            );
        }

        #[test]
        fn register_writes_pass_parameters() {
            let mut channel = MockSecureChannel::new();
            channel
                .expect_invoke()
                .with(
                    eq(Command::WriteRegister),
                    eq(protected::HDCP_CTRL),
                    eq(protected::HPD_ACTIVE),
                )
                .times(1)
                .returning(|_, _, _| Ok(RpcResponse::ok()));
            channel
                .expect_invoke()
                .with(
                    eq(Command::WriteReset),
                    eq(0),
                    eq(protected::reset::HDCP1X),
                )
                .times(1)
                .returning(|_, _, _| Ok(RpcResponse::ok()));
            let mut gateway = opened(channel);
            gateway
                .write_protected_register(protected::HDCP_CTRL, protected::HPD_ACTIVE)
                .unwrap();
            gateway
                .write_reset_control(0, protected::reset::HDCP1X)
                .unwrap();
        }
    }
}
