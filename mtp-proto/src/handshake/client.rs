//! Client side: requests the key.

use std::sync::Arc;

use mtp_crypto::{RandomSource, RsaKey, factorize, generate_key_data_from_nonce, rsa, sha1};
use mtp_tl::{Deserializable, Serializable, enums, functions, types};
use num_bigint::BigUint;

use super::{
    Error, HandshakeEngine, Role, State, check_dh_group, check_dh_value, check_new_nonce_hash,
    check_nonce, check_server_nonce, compute_auth_key, decrypt_hashed, encrypt_hashed,
};
use crate::config::RoleKind;
use crate::message::unix_now;

/// `p_q_inner_data` plus its hash is padded to this many bytes before RSA.
const RSA_PLAINTEXT_LEN: usize = 255;

/// The client role: sends `req_pq` and derives the key from the server's `g_a`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Initiator;

impl Role for Initiator {
    const KIND: RoleKind = RoleKind::Client;

    fn start(engine: &mut HandshakeEngine<Self>) -> Result<Option<Vec<u8>>, Error> {
        engine.req_pq().map(Some)
    }

    fn step(engine: &mut HandshakeEngine<Self>, payload: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match engine.state {
            State::PqRequested => engine.on_res_pq(payload).map(Some),
            State::DhRequested => engine.on_server_dh_params(payload).map(Some),
            State::DhGenerationResultRequested => engine.on_dh_gen_answer(payload),
            state => Err(Error::InvalidState { state }),
        }
    }
}

impl HandshakeEngine<Initiator> {
    /// A client that will only accept a server offering `rsa_key`.
    pub fn client(rsa_key: Arc<RsaKey>, rng: Box<dyn RandomSource + Send>) -> Self {
        Self::with_role(Initiator, rsa_key, rng)
    }

    // ─── Step 1: req_pq ──────────────────────────────────────────────────────

    fn req_pq(&mut self) -> Result<Vec<u8>, Error> {
        let nonce = self.random();
        self.session.client_nonce = nonce;
        self.set_state(State::PqRequested);
        Ok(functions::ReqPq { nonce }.to_bytes())
    }

    // ─── Steps 2-3: res_pq → req_DH_params ───────────────────────────────────

    fn on_res_pq(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let enums::ResPq::ResPq(res_pq) = enums::ResPq::from_bytes(payload)?;
        let nonce = self.session.client_nonce;
        check_nonce(&res_pq.nonce, &nonce)?;

        let pq_bytes: [u8; 8] = res_pq.pq.as_slice()
            .try_into()
            .map_err(|_| Error::InvalidPqSize { size: res_pq.pq.len() })?;
        let pq = u64::from_be_bytes(pq_bytes);
        if pq == 0 {
            return Err(Error::InvalidPq { pq });
        }
        let (p, q) = factorize(pq).ok_or(Error::PqFactorizationFailed { pq })?;
        let (p, q) = match (u32::try_from(p), u32::try_from(q)) {
            (Ok(p), Ok(q)) => (p, q),
            _ => return Err(Error::InvalidPq { pq }),
        };

        if !self.rsa_key.is_valid() || self.rsa_key.byte_len() != 256 {
            return Err(Error::InvalidRsaKey);
        }
        let fingerprint = self.rsa_key.fingerprint();
        if !res_pq.server_public_key_fingerprints.contains(&fingerprint) {
            return Err(Error::UnknownFingerprint {
                expected: fingerprint,
                fingerprints: res_pq.server_public_key_fingerprints,
            });
        }

        let server_nonce = res_pq.server_nonce;
        self.session.server_nonce = server_nonce;
        self.session.pq = pq;
        self.session.p = p;
        self.session.q = q;
        self.set_state(State::PqAccepted);

        let new_nonce = self.random();
        self.session.new_nonce = new_nonce;

        let inner = enums::PQInnerData::PQInnerData(types::PQInnerData {
            pq: pq.to_be_bytes().to_vec(),
            p: p.to_be_bytes().to_vec(),
            q: q.to_be_bytes().to_vec(),
            nonce,
            server_nonce,
            new_nonce,
        })
        .to_bytes();

        let mut data = Vec::with_capacity(RSA_PLAINTEXT_LEN);
        data.extend(sha1!(&inner));
        data.extend_from_slice(&inner);
        let mut padding = vec![0u8; RSA_PLAINTEXT_LEN - data.len()];
        self.rng.fill_bytes(&mut padding);
        data.extend_from_slice(&padding);
        let encrypted_data = rsa::encrypt(&data, &self.rsa_key)?;

        self.set_state(State::DhRequested);
        Ok(functions::ReqDhParams {
            nonce,
            server_nonce,
            p: p.to_be_bytes().to_vec(),
            q: q.to_be_bytes().to_vec(),
            public_key_fingerprint: fingerprint,
            encrypted_data,
        }
        .to_bytes())
    }

    // ─── Step 4: server_DH_params ────────────────────────────────────────────

    fn on_server_dh_params(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = self.session.client_nonce;
        let server_nonce = self.session.server_nonce;
        let new_nonce = self.session.new_nonce;

        let ok = match enums::ServerDhParams::from_bytes(payload)? {
            enums::ServerDhParams::Fail(fail) => {
                check_nonce(&fail.nonce, &nonce)?;
                check_server_nonce(&fail.server_nonce, &server_nonce)?;
                let digest = sha1!(&new_nonce);
                let mut expected = [0u8; 16];
                expected.copy_from_slice(&digest[4..]);
                check_new_nonce_hash(&fail.new_nonce_hash, &expected)?;
                self.set_state(State::DhRepliedFail);
                return Err(Error::DhParamsFail);
            }
            enums::ServerDhParams::Ok(ok) => ok,
        };
        check_nonce(&ok.nonce, &nonce)?;
        check_server_nonce(&ok.server_nonce, &server_nonce)?;

        let key = generate_key_data_from_nonce(&server_nonce, &new_nonce);
        let enums::ServerDhInnerData::ServerDhInnerData(inner) =
            decrypt_hashed::<enums::ServerDhInnerData>(&ok.encrypted_answer, &key)?;
        check_nonce(&inner.nonce, &nonce)?;
        check_server_nonce(&inner.server_nonce, &server_nonce)?;

        let g = u32::try_from(inner.g).map_err(|_| Error::InvalidG { g: inner.g })?;
        check_dh_group(&inner.dh_prime, g)?;
        let prime = BigUint::from_bytes_be(&inner.dh_prime);
        check_dh_value("g_a", &inner.g_a, &prime)?;

        self.session.g = g;
        self.session.dh_prime = inner.dh_prime;
        self.session.peer_public = inner.g_a;
        self.session.time_offset = inner.server_time.wrapping_sub(unix_now());
        self.session.tmp_aes_key = Some(key);
        self.set_state(State::DhRepliedOk);

        self.set_client_dh_params()
    }

    // ─── Steps 5-6: generate b, set_client_DH_params ─────────────────────────

    fn set_client_dh_params(&mut self) -> Result<Vec<u8>, Error> {
        let key = self.tmp_aes_key()?;
        let secret: [u8; 256] = self.random();
        let g_b = mtp_crypto::mod_exp(&self.session.g.to_be_bytes(), &self.session.dh_prime, &secret);
        check_dh_value("g_b", &g_b, &BigUint::from_bytes_be(&self.session.dh_prime))?;
        self.session.secret = secret.to_vec();

        let nonce = self.session.client_nonce;
        let server_nonce = self.session.server_nonce;
        let inner = enums::ClientDhInnerData::ClientDhInnerData(types::ClientDhInnerData {
            nonce,
            server_nonce,
            retry_id: self.session.retry_id,
            g_b,
        })
        .to_bytes();
        let encrypted_data = encrypt_hashed(&inner, &key, &mut self.rng)?;

        self.set_state(State::DhGenerationResultRequested);
        Ok(functions::SetClientDhParams { nonce, server_nonce, encrypted_data }.to_bytes())
    }

    // ─── Step 7: dh_gen_ok / dh_gen_retry / dh_gen_fail ──────────────────────

    fn on_dh_gen_answer(&mut self, payload: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let (nonce, server_nonce, hash, number) = match enums::SetClientDhParamsAnswer::from_bytes(payload)? {
            enums::SetClientDhParamsAnswer::DhGenOk(x) => (x.nonce, x.server_nonce, x.new_nonce_hash1, 1),
            enums::SetClientDhParamsAnswer::DhGenRetry(x) => (x.nonce, x.server_nonce, x.new_nonce_hash2, 2),
            enums::SetClientDhParamsAnswer::DhGenFail(x) => (x.nonce, x.server_nonce, x.new_nonce_hash3, 3),
        };
        check_nonce(&nonce, &self.session.client_nonce)?;
        check_server_nonce(&server_nonce, &self.session.server_nonce)?;

        let auth_key = compute_auth_key(&self.session.peer_public, &self.session.secret, &self.session.dh_prime)?;
        let expected = auth_key.calc_new_nonce_hash(&self.session.new_nonce, number);
        check_new_nonce_hash(&hash, &expected)?;

        match number {
            1 => {
                self.finish(auth_key);
                Ok(None)
            }
            2 => {
                self.retries += 1;
                self.session.retry_id = auth_key.retry_id();
                log::warn!("[handshake] dh_gen_retry #{}, regenerating b", self.retries);
                self.set_client_dh_params().map(Some)
            }
            _ => Err(Error::DhGenFail),
        }
    }
}
