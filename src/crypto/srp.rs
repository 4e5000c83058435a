use super::CryptoError;
use num_bigint::{BigUint, RandomBits};
use rand::Rng;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

/// RFC 5054 3072-bit group (group 15), `g = 5`.
const N_HEX: &[u8] = b"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08\
    8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B\
    302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9\
    A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6\
    49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8\
    FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D\
    670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C\
    180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
    3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D\
    04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D\
    B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226\
    1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C\
    BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC\
    E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF";

/// 3072-bit SRP group is fixed at 384-byte field elements.
const FIELD_BYTES: usize = 384;

const SRP_USERNAME: &[u8] = b"Pair-Setup";

fn pad(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() >= FIELD_BYTES {
        return bytes.to_vec();
    }
    let mut padded = vec![0u8; FIELD_BYTES];
    padded[FIELD_BYTES - bytes.len()..].copy_from_slice(bytes);
    padded
}

fn group() -> (BigUint, BigUint) {
    let n = BigUint::parse_bytes(N_HEX, 16).expect("static RFC5054 constant parses");
    let g = BigUint::from(5u32);
    (n, g)
}

fn compute_k(n: &BigUint, g: &BigUint) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(pad(&n.to_bytes_be()));
    hasher.update(pad(&g.to_bytes_be()));
    BigUint::from_bytes_be(&hasher.finalize())
}

/// The accessory's role in SRP-6a: it plays the SRP *server*, holding the
/// password verifier and proving knowledge of the shared secret without
/// ever transmitting the password itself.
///
/// One instance covers a single pair-setup attempt (M1 through M4); the
/// pairing engine discards it once the session either completes M4 or
/// aborts.
pub struct SrpServer {
    n: BigUint,
    g: BigUint,
    k: BigUint,
    b: BigUint,
    public_key: Vec<u8>,
    salt: [u8; 16],
    verifier: BigUint,
}

impl SrpServer {
    /// Start a new exchange for the given setup code (accessory PIN).
    ///
    /// Chooses a fresh 16-byte salt and 32-byte secret exponent `b`, derives
    /// the password verifier `v`, and computes the public ephemeral `B`.
    pub fn new(password: &[u8]) -> Result<Self, CryptoError> {
        let (n, g) = group();
        let k = compute_k(&n, &g);

        let mut rng = rand::thread_rng();
        let mut salt = [0u8; 16];
        rng.fill(&mut salt);

        let verifier = Self::compute_verifier(&n, &g, &salt, password);

        let b: BigUint = {
            let raw: BigUint = rng.sample(RandomBits::new(256));
            raw % &n
        };

        // B = k*v + g^b (mod n)
        let b_pub = (&k * &verifier + g.modpow(&b, &n)) % &n;
        let public_key = pad(&b_pub.to_bytes_be());

        Ok(Self {
            n,
            g,
            k,
            b,
            public_key,
            salt,
            verifier,
        })
    }

    fn compute_verifier(n: &BigUint, g: &BigUint, salt: &[u8], password: &[u8]) -> BigUint {
        let x = Self::compute_x(salt, password);
        g.modpow(&x, n)
    }

    fn compute_x(salt: &[u8], password: &[u8]) -> BigUint {
        let mut inner = Sha512::new();
        inner.update(SRP_USERNAME);
        inner.update(b":");
        inner.update(password);
        let h_up = inner.finalize();

        let mut outer = Sha512::new();
        outer.update(salt);
        outer.update(h_up);
        BigUint::from_bytes_be(&outer.finalize())
    }

    /// 16-byte salt to send in M2.
    pub fn salt(&self) -> &[u8; 16] {
        &self.salt
    }

    /// 384-byte public ephemeral `B` to send in M2.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Process the controller's M3 (`A`, `M1_client`). Returns the session
    /// proof generator on success; fails with `CryptoError::BadSignature` if
    /// the client's proof doesn't match (wrong password).
    pub fn verify_client_proof(&self, client_public: &[u8], client_proof: &[u8]) -> Result<SrpSession, CryptoError> {
        let a_pub = BigUint::from_bytes_be(client_public);
        if &a_pub % &self.n == BigUint::from(0u32) {
            return Err(CryptoError::Srp("client public key is zero mod N".into()));
        }

        let u = {
            let mut hasher = Sha512::new();
            hasher.update(pad(&a_pub.to_bytes_be()));
            hasher.update(&self.public_key);
            BigUint::from_bytes_be(&hasher.finalize())
        };

        // S = (A * v^u) ^ b (mod n)
        let s_shared = (&a_pub * self.verifier.modpow(&u, &self.n)).modpow(&self.b, &self.n);

        let mut k_session = Sha512::digest(s_shared.to_bytes_be()).to_vec();

        let expected_m1 = {
            let hn = Sha512::digest(self.n.to_bytes_be());
            let hg = Sha512::digest(self.g.to_bytes_be());
            let mut hn_xor_hg = [0u8; 64];
            for i in 0..64 {
                hn_xor_hg[i] = hn[i] ^ hg[i];
            }
            let h_user = Sha512::digest(SRP_USERNAME);

            let mut hasher = Sha512::new();
            hasher.update(hn_xor_hg);
            hasher.update(h_user);
            hasher.update(self.salt);
            hasher.update(pad(&a_pub.to_bytes_be()));
            hasher.update(&self.public_key);
            hasher.update(&k_session);
            hasher.finalize().to_vec()
        };

        if !constant_time_eq(&expected_m1, client_proof) {
            k_session.zeroize();
            return Err(CryptoError::BadSignature);
        }

        // M2 = H(A || M1 || K)
        let m2 = {
            let mut hasher = Sha512::new();
            hasher.update(pad(&a_pub.to_bytes_be()));
            hasher.update(client_proof);
            hasher.update(&k_session);
            hasher.finalize().to_vec()
        };

        Ok(SrpSession {
            shared_key: k_session,
            server_proof: m2,
        })
    }
}

/// Compares two equal-length buffers without branching on the first
/// mismatching byte, so failure timing doesn't leak *where* they differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Result of a completed M3 verification: the shared session key `K` used
/// to derive `PS-Msg05`/`PS-Msg06` encryption keys, and the `M2` proof to
/// send back as `State=4`.
pub struct SrpSession {
    shared_key: Vec<u8>,
    server_proof: Vec<u8>,
}

impl SrpSession {
    /// 64-byte SRP session key `K = H(S)`.
    pub fn shared_key(&self) -> &[u8] {
        &self.shared_key
    }

    /// `M2`, the accessory's proof sent in M4.
    pub fn server_proof(&self) -> &[u8] {
        &self.server_proof
    }
}

impl Drop for SrpSession {
    fn drop(&mut self) {
        self.shared_key.zeroize();
    }
}
