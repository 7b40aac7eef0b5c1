//! Pollard-rho (Brent variant) integer factorization, used for the PQ step.

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 { let t = b; b = a % b; a = t; }
    a
}

fn abs_sub(a: u128, b: u128) -> u128 { a.max(b) - a.min(b) }

fn step(y: u128, c: u128, n: u128) -> u128 { (y * y % n + c) % n }

/// Bound on `step` calls per attempt. A prime `pq` never yields a factor.
const MAX_STEPS: u32 = 1 << 20;

fn brent(pq: u128, c: u128) -> u128 {
    let mut steps = 0u32;
    let mut y = 3 * (pq / 7);
    let m = 7 * (pq / 13);
    let mut g = 1u128;
    let mut r = 1u128;
    let mut q = 1u128;
    let mut x = 0u128;
    let mut ys = 0u128;

    while g == 1 {
        x = y;
        for _ in 0..r { y = step(y, c, pq); }
        let mut k = 0;
        while k < r && g == 1 {
            ys = y;
            for _ in 0..m.min(r - k).max(1) {
                steps += 1;
                y = step(y, c, pq);
                q = q * abs_sub(x, y) % pq;
            }
            g = gcd(q, pq);
            k += m.max(1);
        }
        r *= 2;
        if steps >= MAX_STEPS {
            return 1;
        }
    }

    if g == pq {
        loop {
            ys = step(ys, c, pq);
            g = gcd(abs_sub(x, ys), pq);
            if g > 1 { break; }
            steps += 1;
            if steps >= MAX_STEPS { return 1; }
        }
    }
    g
}

/// Find a non-trivial factor of the semiprime `pq`.
///
/// Returns one of the two prime factors, or `1` when no factor was found
/// (`pq` prime, or below 4). Callers must treat `1` as a failed handshake.
pub fn find_pq_factor(pq: u64) -> u64 {
    if pq < 4 {
        return 1;
    }
    if pq % 2 == 0 {
        return 2;
    }
    let n = pq as u128;
    for attempt in [43u128, 47, 53, 59, 61] {
        let c = match (attempt * (n / 103)) % n {
            0 => (attempt % n).max(1),
            c => c,
        };
        let g = brent(n, c);
        if g != 1 && g != n {
            return g as u64;
        }
    }
    1
}

/// Factorize `pq` into `(p, q)` with `p ≤ q`, or `None` on failure.
pub fn factorize(pq: u64) -> Option<(u64, u64)> {
    match find_pq_factor(pq) {
        1 => None,
        f => {
            let other = pq / f;
            Some((f.min(other), f.max(other)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t1() { assert_eq!(factorize(1470626929934143021), Some((1206429347, 1218991343))); }

    #[test]
    fn t2() { assert_eq!(factorize(2363612107535801713), Some((1518968219, 1556064227))); }

    #[test]
    fn demonstration_pq() {
        let (p, q) = (1244159563u64, 1558201013u64);
        let f = find_pq_factor(p * q);
        assert!(f == p || f == q, "got {f}");
    }

    #[test]
    fn small_semiprimes() {
        for (p, q) in [(3u64, 5u64), (11, 13), (101, 103), (65521, 65537)] {
            assert_eq!(factorize(p * q), Some((p, q)));
        }
    }

    #[test]
    fn failure_returns_one() {
        assert_eq!(find_pq_factor(0), 1);
        assert_eq!(find_pq_factor(1), 1);
        assert_eq!(find_pq_factor(1_000_000_007), 1); // prime
        assert_eq!(factorize(1_000_000_007), None);
    }

    #[test]
    fn large_prime_terminates() {
        // Largest prime below 2^63.
        assert_eq!(find_pq_factor(9223372036854775783), 1);
        assert_eq!(factorize(9223372036854775783), None);
    }
}
