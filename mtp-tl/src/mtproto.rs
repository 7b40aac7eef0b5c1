//! Handshake and service records of the low-level MTProto schema.
//!
//! Only the records the protocol engine itself speaks are declared here; the
//! application schema rides on the same [`Serializable`](crate::Serializable)/[`Deserializable`](crate::Deserializable)
//! machinery but is not part of this crate.
//!
//! Conventions match generated TL code:
//!
//! | Module        | Serialization                                   |
//! |---------------|-------------------------------------------------|
//! | [`types`]     | bare (fields only), tag via [`Identifiable`](crate::Identifiable)    |
//! | [`enums`]     | boxed (tag + fields), dispatch on the tag       |
//! | [`functions`] | tag + fields; deserialization reads fields only |

/// Declares a TL record: struct, [`Identifiable`], bare (de)serialization.
macro_rules! tl_record {
    (
        $(#[$meta:meta])*
        $name:ident # $id:literal {
            $( $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $( pub $field: $ty, )*
        }

        impl crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $( self.$field.serialize(buf); )*
            }
        }

        impl crate::Deserializable for $name {
            fn deserialize(buf: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {
                $( let $field = <$ty>::deserialize(buf)?; )*
                Ok(Self { $( $field, )* })
            }
        }
    };
}

/// Declares a TL function: like [`tl_record!`] but the tag is written first.
macro_rules! tl_function {
    (
        $(#[$meta:meta])*
        $name:ident # $id:literal -> $ret:ty {
            $( $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $( pub $field: $ty, )*
        }

        impl crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                use crate::Identifiable;
                Self::CONSTRUCTOR_ID.serialize(buf);
                $( self.$field.serialize(buf); )*
            }
        }

        impl crate::Deserializable for $name {
            fn deserialize(buf: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {
                $( let $field = <$ty>::deserialize(buf)?; )*
                Ok(Self { $( $field, )* })
            }
        }

        impl crate::RemoteCall for $name {
            type Return = $ret;
        }
    };
}

// ─── types ────────────────────────────────────────────────────────────────────

/// Bare constructors.
pub mod types {
    use crate::deserialize::{Buffer, Error, Result};
    use crate::{Deserializable, Serializable};

    tl_record! {
        /// ```tl
        /// resPQ#05162463 nonce:int128 server_nonce:int128 pq:string server_public_key_fingerprints:Vector<long> = ResPQ;
        /// ```
        ResPq #0x05162463 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            pq: Vec<u8>,
            server_public_key_fingerprints: Vec<i64>,
        }
    }

    tl_record! {
        /// ```tl
        /// p_q_inner_data#83c95aec pq:string p:string q:string nonce:int128 server_nonce:int128 new_nonce:int256 = P_Q_inner_data;
        /// ```
        PQInnerData #0x83c95aec {
            pq: Vec<u8>,
            p: Vec<u8>,
            q: Vec<u8>,
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce: [u8; 32],
        }
    }

    tl_record! {
        /// ```tl
        /// server_DH_params_fail#79cb045d nonce:int128 server_nonce:int128 new_nonce_hash:int128 = Server_DH_Params;
        /// ```
        ServerDhParamsFail #0x79cb045d {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash: [u8; 16],
        }
    }

    tl_record! {
        /// ```tl
        /// server_DH_params_ok#d0e8075c nonce:int128 server_nonce:int128 encrypted_answer:string = Server_DH_Params;
        /// ```
        ServerDhParamsOk #0xd0e8075c {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            encrypted_answer: Vec<u8>,
        }
    }

    tl_record! {
        /// ```tl
        /// server_DH_inner_data#b5890dba nonce:int128 server_nonce:int128 g:int dh_prime:string g_a:string server_time:int = Server_DH_inner_data;
        /// ```
        ServerDhInnerData #0xb5890dba {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            g: i32,
            dh_prime: Vec<u8>,
            g_a: Vec<u8>,
            server_time: i32,
        }
    }

    tl_record! {
        /// ```tl
        /// client_DH_inner_data#6643b654 nonce:int128 server_nonce:int128 retry_id:long g_b:string = Client_DH_Inner_Data;
        /// ```
        ClientDhInnerData #0x6643b654 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            retry_id: i64,
            g_b: Vec<u8>,
        }
    }

    tl_record! {
        /// ```tl
        /// dh_gen_ok#3bcbf734 nonce:int128 server_nonce:int128 new_nonce_hash1:int128 = Set_client_DH_params_answer;
        /// ```
        DhGenOk #0x3bcbf734 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash1: [u8; 16],
        }
    }

    tl_record! {
        /// ```tl
        /// dh_gen_retry#46dc1fb9 nonce:int128 server_nonce:int128 new_nonce_hash2:int128 = Set_client_DH_params_answer;
        /// ```
        DhGenRetry #0x46dc1fb9 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash2: [u8; 16],
        }
    }

    tl_record! {
        /// ```tl
        /// dh_gen_fail#a69dae02 nonce:int128 server_nonce:int128 new_nonce_hash3:int128 = Set_client_DH_params_answer;
        /// ```
        DhGenFail #0xa69dae02 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash3: [u8; 16],
        }
    }

    tl_record! {
        /// ```tl
        /// gzip_packed#3072cfa1 packed_data:string = Object;
        /// ```
        GzipPacked #0x3072cfa1 {
            packed_data: Vec<u8>,
        }
    }

    /// One entry of a `msg_container`.
    ///
    /// ```tl
    /// message msg_id:long seqno:int bytes:int body:Object = Message;
    /// ```
    ///
    /// `body` is kept as raw bytes; its length is the `bytes` field.
    #[derive(Clone, Debug, PartialEq)]
    pub struct Message {
        pub msg_id: i64,
        pub seqno: i32,
        pub body: Vec<u8>,
    }

    impl Serializable for Message {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            self.msg_id.serialize(buf);
            self.seqno.serialize(buf);
            (self.body.len() as u32).serialize(buf);
            buf.extend(self.body.iter().copied());
        }
    }

    impl Deserializable for Message {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let msg_id = i64::deserialize(buf)?;
            let seqno = i32::deserialize(buf)?;
            let len = u32::deserialize(buf)? as usize;
            let body = buf.read_slice(len)?.to_vec();
            Ok(Self { msg_id, seqno, body })
        }
    }

    /// ```tl
    /// msg_container#73f1f8dc messages:vector<%Message> = MessageContainer;
    /// ```
    #[derive(Clone, Debug, PartialEq)]
    pub struct MsgContainer {
        pub messages: Vec<Message>,
    }

    impl crate::Identifiable for MsgContainer {
        const CONSTRUCTOR_ID: u32 = 0x73f1f8dc;
    }

    impl Serializable for MsgContainer {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            (self.messages.len() as u32).serialize(buf);
            for m in &self.messages { m.serialize(buf); }
        }
    }

    impl Deserializable for MsgContainer {
        fn deserialize(buf: Buffer) -> Result<Self> {
            let count = u32::deserialize(buf)? as usize;
            // each entry carries at least a 16-byte header
            if count > buf.remaining() / 16 {
                return Err(Error::UnexpectedEof);
            }
            let messages = (0..count)
                .map(|_| Message::deserialize(buf))
                .collect::<Result<_>>()?;
            Ok(Self { messages })
        }
    }
}

// ─── enums ────────────────────────────────────────────────────────────────────

/// Boxed types.
pub mod enums {
    use crate::deserialize::{Buffer, Error, Result};
    use crate::{Deserializable, Identifiable, Serializable};
    use super::types;

    /// Declares a boxed type dispatching on the constructor tag.
    macro_rules! tl_enum {
        (
            $(#[$meta:meta])*
            $name:ident { $( $variant:ident($inner:ty) ),+ $(,)? }
        ) => {
            $(#[$meta])*
            #[derive(Clone, Debug, PartialEq)]
            pub enum $name {
                $( $variant($inner), )+
            }

            impl Serializable for $name {
                fn serialize(&self, buf: &mut impl Extend<u8>) {
                    match self {
                        $(
                            Self::$variant(x) => {
                                <$inner>::CONSTRUCTOR_ID.serialize(buf);
                                x.serialize(buf);
                            }
                        )+
                    }
                }
            }

            impl Deserializable for $name {
                fn deserialize(buf: Buffer) -> Result<Self> {
                    let id = u32::deserialize(buf)?;
                    Ok(match id {
                        $( id if id == <$inner>::CONSTRUCTOR_ID => Self::$variant(<$inner>::deserialize(buf)?), )+
                        _ => return Err(Error::UnexpectedConstructor { id }),
                    })
                }
            }

            $(
                impl From<$inner> for $name {
                    fn from(x: $inner) -> Self { Self::$variant(x) }
                }
            )+
        };
    }

    tl_enum! {
        /// `ResPQ`
        ResPq { ResPq(types::ResPq) }
    }

    tl_enum! {
        /// `P_Q_inner_data`
        PQInnerData { PQInnerData(types::PQInnerData) }
    }

    tl_enum! {
        /// `Server_DH_Params`
        ServerDhParams {
            Fail(types::ServerDhParamsFail),
            Ok(types::ServerDhParamsOk),
        }
    }

    tl_enum! {
        /// `Server_DH_inner_data`
        ServerDhInnerData { ServerDhInnerData(types::ServerDhInnerData) }
    }

    tl_enum! {
        /// `Client_DH_Inner_Data`
        ClientDhInnerData { ClientDhInnerData(types::ClientDhInnerData) }
    }

    tl_enum! {
        /// `Set_client_DH_params_answer`
        SetClientDhParamsAnswer {
            DhGenOk(types::DhGenOk),
            DhGenRetry(types::DhGenRetry),
            DhGenFail(types::DhGenFail),
        }
    }

    tl_enum! {
        /// `MessageContainer`
        MessageContainer { MsgContainer(types::MsgContainer) }
    }
}

// ─── functions ────────────────────────────────────────────────────────────────

/// Handshake requests.
pub mod functions {
    use super::enums;

    tl_function! {
        /// ```tl
        /// req_pq#60469778 nonce:int128 = ResPQ;
        /// ```
        ReqPq #0x60469778 -> enums::ResPq {
            nonce: [u8; 16],
        }
    }

    tl_function! {
        /// ```tl
        /// req_pq_multi#be7e8ef1 nonce:int128 = ResPQ;
        /// ```
        ReqPqMulti #0xbe7e8ef1 -> enums::ResPq {
            nonce: [u8; 16],
        }
    }

    tl_function! {
        /// ```tl
        /// req_DH_params#d712e4be nonce:int128 server_nonce:int128 p:string q:string public_key_fingerprint:long encrypted_data:string = Server_DH_Params;
        /// ```
        ReqDhParams #0xd712e4be -> enums::ServerDhParams {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            p: Vec<u8>,
            q: Vec<u8>,
            public_key_fingerprint: i64,
            encrypted_data: Vec<u8>,
        }
    }

    tl_function! {
        /// ```tl
        /// set_client_DH_params#f5045f1f nonce:int128 server_nonce:int128 encrypted_data:string = Set_client_DH_params_answer;
        /// ```
        SetClientDhParams #0xf5045f1f -> enums::SetClientDhParamsAnswer {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            encrypted_data: Vec<u8>,
        }
    }
}

/// Returns the TL name for a known constructor ID.
#[cfg(feature = "name-for-id")]
pub fn name_for_id(id: u32) -> Option<&'static str> {
    Some(match id {
        0x05162463 => "resPQ",
        0x83c95aec => "p_q_inner_data",
        0x79cb045d => "server_DH_params_fail",
        0xd0e8075c => "server_DH_params_ok",
        0xb5890dba => "server_DH_inner_data",
        0x6643b654 => "client_DH_inner_data",
        0x3bcbf734 => "dh_gen_ok",
        0x46dc1fb9 => "dh_gen_retry",
        0xa69dae02 => "dh_gen_fail",
        0x60469778 => "req_pq",
        0xbe7e8ef1 => "req_pq_multi",
        0xd712e4be => "req_DH_params",
        0xf5045f1f => "set_client_DH_params",
        0x73f1f8dc => "msg_container",
        0x3072cfa1 => "gzip_packed",
        crate::VECTOR_ID => "vector",
        _ => return None,
    })
}
