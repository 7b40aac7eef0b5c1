//! Server side: answers the key request.

use std::sync::Arc;

use mtp_crypto::{RandomSource, RsaKey, generate_key_data_from_nonce, rsa};
use mtp_tl::{Cursor, Deserializable, Identifiable, Serializable, enums, functions, types};
use num_bigint::BigUint;

use super::{
    Error, HandshakeEngine, Role, State, check_dh_group, check_dh_value, check_nonce,
    check_server_nonce, compute_auth_key, decrypt_hashed, encrypt_hashed, parse_hashed,
};
use crate::config::{DhGroup, RoleKind};
use crate::message::unix_now;

/// Factors of the fixed `pq` a server hands out.
pub const DEMO_P: u32 = 1244159563;
pub const DEMO_Q: u32 = 1558201013;

/// The server role: owns the RSA secret exponent and the DH group.
#[derive(Clone, Debug)]
pub struct Responder {
    dh_group: DhGroup,
    force_retry: bool,
    retry_sent: bool,
}

impl Role for Responder {
    const KIND: RoleKind = RoleKind::Server;

    fn start(_engine: &mut HandshakeEngine<Self>) -> Result<Option<Vec<u8>>, Error> {
        Ok(None)
    }

    fn step(engine: &mut HandshakeEngine<Self>, payload: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match engine.state {
            State::Idle => engine.on_req_pq(payload).map(Some),
            State::PqRequested => engine.on_req_dh_params(payload).map(Some),
            State::DhRepliedOk => engine.on_set_client_dh_params(payload).map(Some),
            state => Err(Error::InvalidState { state }),
        }
    }
}

/// Read a function call: tag first, then the fields.
fn read_call<T: Identifiable + Deserializable>(payload: &[u8]) -> Result<T, Error> {
    let mut cursor = Cursor::from_slice(payload);
    cursor.expect_tag(T::CONSTRUCTOR_ID)?;
    Ok(T::deserialize(&mut cursor)?)
}

impl HandshakeEngine<Responder> {
    /// A server answering with `rsa_key` (which must carry its secret
    /// exponent) and `dh_group`.
    pub fn server(rsa_key: Arc<RsaKey>, dh_group: DhGroup, rng: Box<dyn RandomSource + Send>) -> Self {
        let role = Responder { dh_group, force_retry: false, retry_sent: false };
        Self::with_role(role, rsa_key, rng)
    }

    /// Answer the first `set_client_DH_params` with `dh_gen_retry`.
    pub fn with_forced_retry(mut self) -> Self {
        self.role.force_retry = true;
        self
    }

    // ─── req_pq → res_pq ─────────────────────────────────────────────────────

    fn on_req_pq(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = match mtp_tl::peek_tag(payload) {
            Some(id) if id == functions::ReqPq::CONSTRUCTOR_ID => read_call::<functions::ReqPq>(payload)?.nonce,
            Some(id) if id == functions::ReqPqMulti::CONSTRUCTOR_ID => read_call::<functions::ReqPqMulti>(payload)?.nonce,
            Some(id) => return Err(Error::UnexpectedConstructor { id }),
            None => return Err(Error::Decode(mtp_tl::deserialize::Error::UnexpectedEof)),
        };

        let server_nonce = self.random();
        let pq = u64::from(DEMO_P) * u64::from(DEMO_Q);
        self.session.client_nonce = nonce;
        self.session.server_nonce = server_nonce;
        self.session.pq = pq;
        self.session.p = DEMO_P;
        self.session.q = DEMO_Q;
        self.set_state(State::PqRequested);

        Ok(enums::ResPq::ResPq(types::ResPq {
            nonce,
            server_nonce,
            pq: pq.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![self.rsa_key.fingerprint()],
        })
        .to_bytes())
    }

    // ─── req_DH_params → server_DH_params_ok ─────────────────────────────────

    fn on_req_dh_params(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let req = read_call::<functions::ReqDhParams>(payload)?;
        let nonce = self.session.client_nonce;
        let server_nonce = self.session.server_nonce;
        check_nonce(&req.nonce, &nonce)?;
        check_server_nonce(&req.server_nonce, &server_nonce)?;

        let fingerprint = self.rsa_key.fingerprint();
        if req.public_key_fingerprint != fingerprint {
            return Err(Error::UnknownFingerprint {
                expected: fingerprint,
                fingerprints: vec![req.public_key_fingerprint],
            });
        }
        let (p, q) = (self.session.p.to_be_bytes(), self.session.q.to_be_bytes());
        if req.p != p || req.q != q {
            return Err(Error::InvalidFactors { p: req.p, q: req.q });
        }
        if req.encrypted_data.len() != self.rsa_key.byte_len() {
            return Err(Error::InvalidEncryptedLength { len: req.encrypted_data.len() });
        }

        // 256 bytes out; the first is the zero the client's 255 bytes leave
        let decrypted = rsa::decrypt(&req.encrypted_data, &self.rsa_key)?;
        let enums::PQInnerData::PQInnerData(inner) =
            parse_hashed::<enums::PQInnerData>(&decrypted[1..])?;
        check_nonce(&inner.nonce, &nonce)?;
        check_server_nonce(&inner.server_nonce, &server_nonce)?;
        if inner.pq != self.session.pq.to_be_bytes() {
            return Err(Error::InvalidPq { pq: self.session.pq });
        }
        if inner.p != p || inner.q != q {
            return Err(Error::InvalidFactors { p: inner.p, q: inner.q });
        }
        let new_nonce = inner.new_nonce;
        self.session.new_nonce = new_nonce;
        self.set_state(State::PqAccepted);

        let DhGroup { prime, g } = self.role.dh_group.clone();
        check_dh_group(&prime, g)?;
        let secret: [u8; 256] = self.random();
        let g_a = mtp_crypto::mod_exp_padded(&g.to_be_bytes(), &prime, &secret, 256);
        check_dh_value("g_a", &g_a, &BigUint::from_bytes_be(&prime))?;

        let key = generate_key_data_from_nonce(&server_nonce, &new_nonce);
        let answer = enums::ServerDhInnerData::ServerDhInnerData(types::ServerDhInnerData {
            nonce,
            server_nonce,
            g: g as i32,
            dh_prime: prime.clone(),
            g_a,
            server_time: unix_now(),
        })
        .to_bytes();
        let encrypted_answer = encrypt_hashed(&answer, &key, &mut self.rng)?;

        self.session.g = g;
        self.session.dh_prime = prime;
        self.session.secret = secret.to_vec();
        self.session.tmp_aes_key = Some(key);
        self.set_state(State::DhRepliedOk);

        Ok(enums::ServerDhParams::Ok(types::ServerDhParamsOk { nonce, server_nonce, encrypted_answer }).to_bytes())
    }

    // ─── set_client_DH_params → dh_gen_ok | dh_gen_retry ─────────────────────

    fn on_set_client_dh_params(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let req = read_call::<functions::SetClientDhParams>(payload)?;
        let nonce = self.session.client_nonce;
        let server_nonce = self.session.server_nonce;
        check_nonce(&req.nonce, &nonce)?;
        check_server_nonce(&req.server_nonce, &server_nonce)?;

        let key = self.tmp_aes_key()?;
        let enums::ClientDhInnerData::ClientDhInnerData(inner) =
            decrypt_hashed::<enums::ClientDhInnerData>(&req.encrypted_data, &key)?;
        check_nonce(&inner.nonce, &nonce)?;
        check_server_nonce(&inner.server_nonce, &server_nonce)?;
        if inner.retry_id != 0 && inner.retry_id != self.session.retry_id {
            return Err(Error::InvalidRetryId { got: inner.retry_id, expected: self.session.retry_id });
        }
        check_dh_value("g_b", &inner.g_b, &BigUint::from_bytes_be(&self.session.dh_prime))?;
        self.set_state(State::DhGenerationResultRequested);

        let auth_key = compute_auth_key(&inner.g_b, &self.session.secret, &self.session.dh_prime)?;
        let new_nonce = self.session.new_nonce;

        if self.role.force_retry && !self.role.retry_sent {
            self.role.retry_sent = true;
            self.retries += 1;
            self.session.retry_id = auth_key.retry_id();
            self.session.peer_public = inner.g_b;
            log::debug!("[handshake] asking the client for another g_b");
            self.set_state(State::DhRepliedOk);
            return Ok(enums::SetClientDhParamsAnswer::DhGenRetry(types::DhGenRetry {
                nonce,
                server_nonce,
                new_nonce_hash2: auth_key.calc_new_nonce_hash(&new_nonce, 2),
            })
            .to_bytes());
        }

        let new_nonce_hash1 = auth_key.calc_new_nonce_hash(&new_nonce, 1);
        self.finish(auth_key);
        Ok(enums::SetClientDhParamsAnswer::DhGenOk(types::DhGenOk { nonce, server_nonce, new_nonce_hash1 }).to_bytes())
    }
}
