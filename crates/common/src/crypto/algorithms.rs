//! Algorithm policy tables
//!
//! Every algorithm Grendel knows about is a plain value carrying its
//! RFC 4880 / RFC 9580 identifier. The tables recognize the whole standard
//! registry so foreign packets decode into something meaningful, but only the
//! `DEFAULT` members are ever produced. `ACCEPTABLE` lists are the preference
//! orders advertised in master key certifications.

use std::fmt;

/// Declares a closed algorithm table with wire codes and display names.
macro_rules! algorithm_table {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code,)+
        }

        impl $name {
            /// Every member of the table, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// The wire identifier of the algorithm.
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Looks up an algorithm by wire identifier.
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// The conventional short name of the algorithm.
            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Decodes a preference list, dropping identifiers we don't know.
            pub fn from_codes(codes: &[u8]) -> Vec<Self> {
                codes.iter().filter_map(|c| Self::from_code(*c)).collect()
            }

            /// Encodes a preference list.
            pub fn to_codes(algorithms: &[Self]) -> Vec<u8> {
                algorithms.iter().map(|a| a.code()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

algorithm_table! {
    /// Public key algorithms.
    AsymmetricAlgorithm {
        Rsa = 1 => "RSA",
        RsaEncryptOnly = 2 => "RSA(E)",
        RsaSignOnly = 3 => "RSA(S)",
        ElGamal = 16 => "ElGamal",
        Dsa = 17 => "DSA",
        Ecdh = 18 => "ECDH",
        Ecdsa = 19 => "ECDSA",
        EdDsa = 22 => "EdDSA",
    }
}

impl AsymmetricAlgorithm {
    /// Algorithm used for master keys.
    pub const SIGNING_DEFAULT: Self = Self::EdDsa;
    /// Algorithm used for subkeys.
    pub const ENCRYPTION_DEFAULT: Self = Self::Ecdh;

    /// Key size in bits for the algorithms we implement.
    pub fn key_size(self) -> Option<u32> {
        match self {
            Self::EdDsa | Self::Ecdh => Some(256),
            _ => None,
        }
    }
}

algorithm_table! {
    /// Symmetric ciphers.
    SymmetricAlgorithm {
        Plaintext = 0 => "plaintext",
        Idea = 1 => "IDEA",
        TripleDes = 2 => "3DES",
        Cast5 = 3 => "CAST5",
        Blowfish = 4 => "Blowfish",
        Aes128 = 7 => "AES-128",
        Aes192 = 8 => "AES-192",
        Aes256 = 9 => "AES-256",
        Twofish = 10 => "Twofish",
    }
}

impl SymmetricAlgorithm {
    /// Cipher used for session keys and for locking secret key material.
    pub const DEFAULT: Self = Self::Aes256;
    /// Ciphers advertised in master key preferences, strongest first.
    pub const ACCEPTABLE: &'static [Self] = &[Self::Aes256, Self::Aes192, Self::Aes128];

    /// Key length in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            Self::Plaintext => 0,
            Self::Idea | Self::Cast5 | Self::Blowfish | Self::Aes128 => 16,
            Self::TripleDes | Self::Aes192 => 24,
            Self::Aes256 | Self::Twofish => 32,
        }
    }
}

algorithm_table! {
    /// Digest algorithms.
    HashAlgorithm {
        Md5 = 1 => "MD5",
        Sha1 = 2 => "SHA-1",
        Ripemd160 = 3 => "RIPEMD-160",
        Sha256 = 8 => "SHA-256",
        Sha384 = 9 => "SHA-384",
        Sha512 = 10 => "SHA-512",
        Sha224 = 11 => "SHA-224",
    }
}

impl HashAlgorithm {
    /// Digest used for message signatures.
    pub const DEFAULT: Self = Self::Sha256;
    /// Digest used for key certifications.
    pub const CERTIFICATION: Self = Self::Sha1;
    /// Digests advertised in master key preferences.
    pub const ACCEPTABLE: &'static [Self] = &[
        Self::Sha512,
        Self::Sha384,
        Self::Sha256,
        Self::Sha224,
        Self::Sha1,
    ];
}

algorithm_table! {
    /// Compression algorithms.
    CompressionAlgorithm {
        Uncompressed = 0 => "uncompressed",
        Zip = 1 => "ZIP",
        Zlib = 2 => "ZLIB",
        Bzip2 = 3 => "BZIP2",
    }
}

impl CompressionAlgorithm {
    /// Compression applied to every written message.
    pub const DEFAULT: Self = Self::Zlib;
    /// Compression preference order advertised by master keys.
    pub const PREFERRED: &'static [Self] = &[Self::Bzip2, Self::Zlib, Self::Zip];
}

algorithm_table! {
    /// AEAD modes.
    AeadAlgorithm {
        Eax = 1 => "EAX",
        Ocb = 2 => "OCB",
        Gcm = 3 => "GCM",
    }
}

impl AeadAlgorithm {
    /// Mode used for message encryption and secret key locking.
    pub const DEFAULT: Self = Self::Gcm;

    /// Nonce length in bytes.
    pub const fn nonce_size(self) -> usize {
        match self {
            Self::Eax => 16,
            Self::Ocb => 15,
            Self::Gcm => 12,
        }
    }
}

algorithm_table! {
    /// Signature types.
    SignatureType {
        Binary = 0x00 => "binary",
        Text = 0x01 => "text",
        GenericCertification = 0x10 => "generic certification",
        PersonaCertification = 0x11 => "persona certification",
        CasualCertification = 0x12 => "casual certification",
        PositiveCertification = 0x13 => "positive certification",
        SubkeyBinding = 0x18 => "subkey binding",
        PrimaryKeyBinding = 0x19 => "primary key binding",
        DirectKey = 0x1F => "direct key",
        KeyRevocation = 0x20 => "key revocation",
        SubkeyRevocation = 0x28 => "subkey revocation",
        CertificationRevocation = 0x30 => "certification revocation",
    }
}

algorithm_table! {
    /// Key usage flags, as asserted by the key flags subpacket.
    KeyFlag {
        Certification = 0x01 => "certification",
        Signing = 0x02 => "signing",
        /// Communications and storage encryption together.
        Encryption = 0x0C => "encryption",
        Split = 0x10 => "split",
        Authentication = 0x20 => "authentication",
        Shared = 0x80 => "shared",
    }
}

/// A set of [`KeyFlag`]s, stored as the wire bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyFlags(u8);

impl KeyFlags {
    /// Flags certified on every generated master key.
    pub const MASTER_KEY_DEFAULTS: Self = Self(0x20 | 0x02 | 0x10);
    /// Flags certified on every generated subkey.
    pub const SUB_KEY_DEFAULTS: Self = Self(0x0C | 0x10);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, flag: KeyFlag) -> bool {
        self.0 & flag.code() == flag.code()
    }

    pub fn iter(self) -> impl Iterator<Item = KeyFlag> {
        KeyFlag::ALL
            .iter()
            .copied()
            .filter(move |flag| self.contains(*flag))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<KeyFlag> for KeyFlags {
    fn from_iter<I: IntoIterator<Item = KeyFlag>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, flag| bits | flag.code()))
    }
}

impl fmt::Display for KeyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(KeyFlag::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_sizes() {
        assert_eq!(SymmetricAlgorithm::DEFAULT.key_size(), 32);
        assert_eq!(SymmetricAlgorithm::Aes128.key_size(), 16);
        assert_eq!(AeadAlgorithm::DEFAULT.nonce_size(), 12);
        assert_eq!(AeadAlgorithm::Ocb.nonce_size(), 15);
    }

    #[test]
    fn test_key_flag_codes() {
        assert_eq!(KeyFlag::Certification.code(), 0x01);
        assert_eq!(KeyFlag::Signing.code(), 0x02);
        assert_eq!(KeyFlag::Encryption.code(), 0x0C);
        assert_eq!(KeyFlag::Split.code(), 0x10);
        assert_eq!(KeyFlag::Authentication.code(), 0x20);
        assert_eq!(KeyFlag::Shared.code(), 0x80);
    }

    #[test]
    fn test_default_flag_sets() {
        let master: KeyFlags = [KeyFlag::Authentication, KeyFlag::Signing, KeyFlag::Split]
            .into_iter()
            .collect();
        assert_eq!(KeyFlags::MASTER_KEY_DEFAULTS, master);

        let sub: KeyFlags = [KeyFlag::Encryption, KeyFlag::Split].into_iter().collect();
        assert_eq!(KeyFlags::SUB_KEY_DEFAULTS, sub);
        assert_eq!(
            sub.iter().collect::<Vec<_>>(),
            vec![KeyFlag::Encryption, KeyFlag::Split]
        );
    }

    #[test]
    fn test_encryption_needs_both_bits() {
        // communications-only encryption is not the ENCRYPTION flag
        assert!(!KeyFlags::from_bits(0x04).contains(KeyFlag::Encryption));
        assert!(KeyFlags::from_bits(0x0C).contains(KeyFlag::Encryption));
    }

    #[test]
    fn test_standard_codes() {
        assert_eq!(AsymmetricAlgorithm::Rsa.code(), 1);
        assert_eq!(AsymmetricAlgorithm::Dsa.code(), 17);
        assert_eq!(AsymmetricAlgorithm::ElGamal.code(), 16);
        assert_eq!(SymmetricAlgorithm::Aes256.code(), 9);
        assert_eq!(SymmetricAlgorithm::Cast5.code(), 3);
        assert_eq!(HashAlgorithm::Sha1.code(), 2);
        assert_eq!(HashAlgorithm::Ripemd160.code(), 3);
        assert_eq!(HashAlgorithm::Sha256.code(), 8);
        assert_eq!(CompressionAlgorithm::Bzip2.code(), 3);
        assert_eq!(SignatureType::PositiveCertification.code(), 0x13);
        assert_eq!(SignatureType::SubkeyBinding.code(), 0x18);
    }

    #[test]
    fn test_from_codes_skips_unknown() {
        let prefs = SymmetricAlgorithm::from_codes(&[9, 42, 7]);
        assert_eq!(
            prefs,
            vec![SymmetricAlgorithm::Aes256, SymmetricAlgorithm::Aes128]
        );
        assert_eq!(HashAlgorithm::from_code(99), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(AsymmetricAlgorithm::EdDsa.to_string(), "EdDSA");
        assert_eq!(
            KeyFlags::SUB_KEY_DEFAULTS.to_string(),
            "{encryption, split}"
        );
    }
}
