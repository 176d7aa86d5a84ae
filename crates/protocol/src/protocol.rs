//! Entry points for both sides of an exchange.

use std::fmt;
use std::sync::Arc;

use crate::cipher::{CipherTool, MacProvider};
use crate::client_body::{ClientBody, ClientBodyBuilder, ClientBodyParser};
use crate::crypto::{EccProvider, KEY_LENGTH};
use crate::error::{ProtocolError, Result};
use crate::server_body::{ServerBody, ServerBodyParser};
use crate::server_param::{ServerParameter, ServerParameterBuilder, TransactionFlags};

/// Binds a curve provider and a MAC provider. Holds no other state and can
/// be shared between threads.
#[derive(Clone)]
pub struct SqrlProtocol {
    ecc: Arc<dyn EccProvider>,
    mac: Arc<dyn MacProvider>,
}

impl SqrlProtocol {
    /// Create a protocol instance from explicit providers.
    pub fn new(ecc: Arc<dyn EccProvider>, mac: Arc<dyn MacProvider>) -> Self {
        Self { ecc, mac }
    }

    pub fn builder() -> SqrlProtocolBuilder {
        SqrlProtocolBuilder::default()
    }

    pub fn ecc_provider(&self) -> &dyn EccProvider {
        &*self.ecc
    }

    pub fn mac_provider(&self) -> &dyn MacProvider {
        &*self.mac
    }

    /// Start a first-contact client request.
    ///
    /// Finish with [`ClientBodyBuilder::build_request`].
    pub fn authenticate<'a>(
        &'a self,
        master_key: &'a [u8; KEY_LENGTH],
        site_key: impl Into<String>,
    ) -> ClientBodyBuilder<'a> {
        ClientBodyBuilder::new(&*self.ecc, &*self.mac, master_key, site_key)
    }

    /// Start a client response to a server body. The unlock keys the server
    /// reported, if any, are carried over as the previous server keys.
    ///
    /// Finish with [`ClientBodyBuilder::build_response_to`].
    pub fn answer_server<'a>(
        &'a self,
        master_key: &'a [u8; KEY_LENGTH],
        site_key: impl Into<String>,
        server_body: &ServerBody,
    ) -> ClientBodyBuilder<'a> {
        let builder = self.authenticate(master_key, site_key);
        let parameter = server_body.server_parameter();
        match (parameter.server_unlock_key(), parameter.verify_unlock_key()) {
            (Some(suk), Some(vuk)) => builder.previous_server_keys(&suk, &vuk),
            _ => builder,
        }
    }

    /// Parser for a client body received by a server.
    pub fn read_client_body(&self) -> ClientBodyParser<'_> {
        ClientBodyParser::new(&*self.ecc)
    }

    /// Start the server parameter answering `client_body`, reusing its nonce.
    pub fn answer_client(
        &self,
        client_body: &ClientBody,
        flags: TransactionFlags,
    ) -> Result<ServerParameterBuilder> {
        let nut = client_body.server_parameter().nut()?;
        Ok(ServerParameter::builder(nut, flags))
    }

    /// Like [`SqrlProtocol::answer_client`] with the flags OR-ed together.
    pub fn answer_client_all<I>(&self, client_body: &ClientBody, flags: I) -> Result<ServerParameterBuilder>
    where
        I: IntoIterator<Item = TransactionFlags>,
    {
        self.answer_client(client_body, flags.into_iter().collect())
    }

    /// Parser for a server body received by a client.
    pub fn read_server_body(&self) -> ServerBodyParser {
        ServerBodyParser::new()
    }
}

impl fmt::Debug for SqrlProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqrlProtocol").finish_non_exhaustive()
    }
}

/// Builder for [`SqrlProtocol`]. The curve provider must be set explicitly.
#[derive(Default)]
pub struct SqrlProtocolBuilder {
    ecc: Option<Arc<dyn EccProvider>>,
    mac: Option<Arc<dyn MacProvider>>,
}

impl SqrlProtocolBuilder {
    pub fn ecc_provider(mut self, ecc: impl EccProvider + 'static) -> Self {
        self.ecc = Some(Arc::new(ecc));
        self
    }

    /// MAC provider, [`CipherTool`] unless set.
    pub fn mac_provider(mut self, mac: impl MacProvider + 'static) -> Self {
        self.mac = Some(Arc::new(mac));
        self
    }

    pub fn build(self) -> Result<SqrlProtocol> {
        let ecc = self
            .ecc
            .ok_or_else(|| ProtocolError::invalid_argument("no curve provider configured"))?;
        let mac: Arc<dyn MacProvider> = match self.mac {
            Some(mac) => mac,
            None => Arc::new(CipherTool::new()),
        };
        Ok(SqrlProtocol::new(ecc, mac))
    }
}
