use cascrypt_crypto::{encrypt_with, kdf, CipherSpec, Credentials, KdfSpec, MacSpec, StreamOptions};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 16384, 65536])]
fn bench_kdf_argon2id(bencher: divan::Bencher, memory_kib: u32) {
    let spec = KdfSpec::new(cascrypt_core::KdfAlgorithm::Argon2id, 1, memory_kib, 4).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(memory_kib as usize * 1024))
        .bench(|| {
            kdf::derive(
                divan::black_box(&spec),
                b"password",
                b"somesaltsomesalt",
                b"",
                64,
            )
            .unwrap()
        });
}

#[divan::bench(args = ["chacha20", "aes-256-ctr", "aes-128-ctr,chacha20"])]
fn bench_encrypt_cipher_cascade(bencher: divan::Bencher, ciphers: &str) {
    encrypt_bench(bencher, ciphers, "poly1305");
}

#[divan::bench(args = ["poly1305", "hmac-sha256", "hmac-sha512,poly1305"])]
fn bench_encrypt_mac_cascade(bencher: divan::Bencher, macs: &str) {
    encrypt_bench(bencher, "chacha20", macs);
}

fn encrypt_bench(bencher: divan::Bencher, ciphers: &str, macs: &str) {
    let size = 4 * 1024 * 1024;
    let data = make_data(size);
    let creds = Credentials::new("password");
    let kdf: KdfSpec = "argon2d,1,8,1".parse().unwrap();
    let ciphers: CipherSpec = ciphers.parse().unwrap();
    let macs: MacSpec = macs.parse().unwrap();
    let options = StreamOptions::default();

    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size + 256);
            encrypt_with(
                &creds,
                &kdf,
                &ciphers,
                &macs,
                divan::black_box(data.as_slice()),
                &mut out,
                &options,
            )
            .unwrap();
            out
        });
}

fn main() {
    divan::main();
}
