//! Dinucleotide context dependent transition parameters.
//!
//! The probability of each move out of a template position depends on the base at that
//! position and the next one, and on the signal strength of the channel of the next base.
//! Four moves are possible: Match, Stick (a non-matching insertion), Branch (an insertion
//! of the next template base), and Deletion. Branch is the reference class of a
//! multinomial logistic regression whose three other linear predictors are cubic
//! polynomials of the SNR.
use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};

const NOT_A_BASE: u8 = 0xff;

const fn base_table() -> [u8; 256] {
    let mut slots = [NOT_A_BASE; 256];
    slots[b'A' as usize] = 0;
    slots[b'C' as usize] = 1;
    slots[b'G' as usize] = 2;
    slots[b'T' as usize] = 3;
    // Extensions, only allowed in reads.
    slots[b'M' as usize] = 4;
    slots[b'N' as usize] = 5;
    slots
}

/// Base -> index. A:0, C:1, G:2, T:3, M:4, N:5. Others are 0xff.
pub const BASE_TABLE: [u8; 256] = base_table();

/// True if the base can be a part of a template.
pub fn is_template_base(base: u8) -> bool {
    BASE_TABLE[base as usize] < 4
}

/// True if the base can be a part of a read.
pub fn is_read_base(base: u8) -> bool {
    BASE_TABLE[base as usize] < 6
}

/// Signal to noise ratio of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snr {
    pub a: f64,
    pub c: f64,
    pub g: f64,
    pub t: f64,
}

impl Snr {
    pub fn new(a: f64, c: f64, g: f64, t: f64) -> Self {
        Self { a, c, g, t }
    }
    /// The SNR of the channel reading `base`, if any.
    pub fn channel(&self, base: u8) -> Option<f64> {
        match base {
            b'A' => Some(self.a),
            b'C' => Some(self.c),
            b'G' => Some(self.g),
            b'T' => Some(self.t),
            _ => None,
        }
    }
}

impl std::default::Default for Snr {
    fn default() -> Self {
        Self::new(10f64, 7f64, 5f64, 11f64)
    }
}

/// The context classes, in the order of the rows of [ContextCoefficients].
pub const CONTEXTS: [[u8; 2]; 8] = [
    *b"AA", *b"CC", *b"GG", *b"NA", *b"NC", *b"NG", *b"NT", *b"TT",
];

// Homopolymer contexts are their own class, others are keyed by the second base.
fn context_class(first: u8, second: u8) -> Option<usize> {
    match (first == second, second) {
        (true, b'A') => Some(0),
        (true, b'C') => Some(1),
        (true, b'G') => Some(2),
        (true, b'T') => Some(7),
        (false, b'A') => Some(3),
        (false, b'C') => Some(4),
        (false, b'G') => Some(5),
        (false, b'T') => Some(6),
        _ => None,
    }
}

fn unknown(first: u8, second: u8) -> ScoringError {
    let context = String::from_utf8_lossy(&[first, second]).to_string();
    ScoringError::UnknownContext { context }
}

/// Transition parameters in log scale. Only used to build [TransitionParameters].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogTransitionParameters {
    pub mat: f64,
    pub stick: f64,
    pub branch: f64,
    pub del: f64,
}

impl LogTransitionParameters {
    pub fn to_natural(&self) -> TransitionParameters {
        TransitionParameters {
            mat: self.mat.exp(),
            stick: self.stick.exp(),
            branch: self.branch.exp(),
            del: self.del.exp(),
        }
    }
    /// log(Pr{Match} + Pr{Stick} + Pr{Branch} + Pr{Deletion}). Should be zero.
    pub fn log_total(&self) -> f64 {
        let xs = [self.mat, self.stick, self.branch, self.del];
        let max = xs.iter().fold(f64::NEG_INFINITY, |x, &y| x.max(y));
        max + xs.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
    }
}

/// Transition parameters in natural scale. As a rule of thumb, we do not take logarithm
/// in the recursion; scaling each column is both faster and stable enough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionParameters {
    /// Pr{Match}
    pub mat: f64,
    /// Pr{Stick}, an insertion not matching the next template base.
    pub stick: f64,
    /// Pr{Branch}, an insertion of the next template base.
    pub branch: f64,
    /// Pr{Deletion}
    pub del: f64,
}

impl TransitionParameters {
    /// The parameters of the last template position, which has no outgoing context.
    pub fn zero() -> Self {
        Self::default()
    }
    pub fn total(&self) -> f64 {
        self.mat + self.stick + self.branch + self.del
    }
}

/// Regression coefficients. For each context class (see [CONTEXTS]),
/// rows are Deletion(dark), Match, Stick, and columns are intercept, SNR, SNR^2, SNR^3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextCoefficients {
    pub table: [[[f64; 4]; 3]; 8],
}

static DEFAULT_COEFFICIENTS: ContextCoefficients = ContextCoefficients {
    table: [
        // AA
        [
            [3.81720201515154, -0.400599603991922, 0.018614437316033, -0.000364751975465911],
            [3.1908276817261, 0.204011581063786, -0.0193345225294932, 0.000449003963971665],
            [-1.25554885160522, 0.461682713184222, -0.040416513891308, 0.000914427334896904],
        ],
        // CC
        [
            [-1.5430928904885, 1.61660832332086, -0.210997020100382, 0.00809223993524581],
            [-3.74791833824717, 2.74983692727893, -0.313124643063006, 0.0113156595067565],
            [-3.75220834760718, 1.75989172436986, -0.197306471137317, 0.00696163670699774],
        ],
        // GG
        [
            [8.81239057584291, -1.90170935230813, 0.182346682060559, -0.00539694591375577],
            [8.13157707315945, -1.15324215504543, 0.119778313278507, -0.00356129865508758],
            [7.25878582072985, -1.97560895808077, 0.185721972297463, -0.00527398059062249],
        ],
        // NA
        [
            [4.87271236251494, -1.0355068989864, 0.0610477738232239, -0.00130093910781944],
            [3.71545404320815, -0.111276259486349, 0.00298240855654832, -2.81445309541181e-05],
            [1.40041901429751, -0.435197508625283, 0.0255148449655911, -0.000581620461800338],
        ],
        // NC
        [
            [10.4302028387037, -3.27440991750123, 0.348001659986844, -0.0125520322736285],
            [7.92713496695142, -1.45779779769921, 0.161089563050961, -0.00592034192017757],
            [3.66876446637389, -1.11334654053442, 0.122005194567391, -0.00447662803608916],
        ],
        // NG
        [
            [2.02994606352135, -0.126177270318536, -0.0226746948052658, 0.00117260770884122],
            [3.12117495502696, 0.256982397810015, -0.0334213623483018, 0.00117900190125973],
            [0.443229415460136, 0.0313821995757453, -0.0222616337671001, 0.00102291356396239],
        ],
        // NT
        [
            [1.916265906613, -0.112957384644716, -0.00955897493038972, 0.000207132127635481],
            [2.44023498513114, 0.457060526378788, -0.0439016920522025, 0.00123404677896527],
            [-2.08160499116939, 0.866536738681778, -0.106997300255227, 0.00380943870174409],
        ],
        // TT
        [
            [1.70503747459888, -0.0874041461144091, -0.012771794368405, 0.000528424406818803],
            [1.51229494096067, 0.513114778366272, -0.0569463299719687, 0.00190682385190301],
            [-0.682649183406059, 0.153767976908084, -0.0421117527911171, 0.00193652817873698],
        ],
    ],
};

impl std::default::Default for ContextCoefficients {
    fn default() -> Self {
        DEFAULT_COEFFICIENTS.clone()
    }
}

impl ContextCoefficients {
    /// The built-in table.
    pub fn builtin() -> &'static Self {
        &DEFAULT_COEFFICIENTS
    }
    /// Evaluate the regression for `context` (such as `*b"AA"` or `*b"NC"`).
    /// Two different bases are looked up as `N` followed by the second one.
    pub fn log_transitions(&self, context: [u8; 2], snr: &Snr) -> Result<LogTransitionParameters> {
        let [first, second] = context;
        let class = context_class(first, second).ok_or_else(|| unknown(first, second))?;
        let snr = snr.channel(second).ok_or_else(|| unknown(first, second))?;
        let (snr2, snr3) = (snr * snr, snr * snr * snr);
        let mut predicts = [0f64; 3];
        for (pred, coef) in predicts.iter_mut().zip(self.table[class].iter()) {
            *pred = (coef[0] + snr * coef[1] + snr2 * coef[2] + snr3 * coef[3]).exp();
        }
        let log_sum = (1f64 + predicts.iter().sum::<f64>()).ln();
        let [dark, mat, stick] = predicts;
        Ok(LogTransitionParameters {
            mat: mat.ln() - log_sum,
            stick: stick.ln() - log_sum,
            branch: -log_sum,
            del: dark.ln() - log_sum,
        })
    }
}

/// Transition parameters of every context class under a fixed SNR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextParameters {
    snr: Snr,
    params: [TransitionParameters; 8],
}

impl ContextParameters {
    pub fn new(coefficients: &ContextCoefficients, snr: Snr) -> Result<Self> {
        let mut params = [TransitionParameters::zero(); 8];
        for (param, &context) in params.iter_mut().zip(CONTEXTS.iter()) {
            *param = coefficients.log_transitions(context, &snr)?.to_natural();
        }
        Ok(Self { snr, params })
    }
    pub fn snr(&self) -> &Snr {
        &self.snr
    }
    /// Parameters for moving out of `first` when the next base is `second`.
    pub fn get(&self, first: u8, second: u8) -> Result<TransitionParameters> {
        context_class(first, second)
            .map(|class| self.params[class])
            .ok_or_else(|| unknown(first, second))
    }
    /// The inverse of the mean probability of the moves emitting a base, over all contexts.
    pub fn match_scaling_factor(&self) -> f64 {
        let prior = (self.params.len() as f64).recip();
        let prob: f64 = self
            .params
            .iter()
            .map(|p| prior * (p.mat + p.branch + p.stick))
            .sum();
        prob.recip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;
    fn close(x: f64, y: f64) -> bool {
        (x - y).abs() < 0.001
    }
    #[test]
    fn snr_regression() {
        let coefs = ContextCoefficients::builtin();
        let snr = Snr::new(6f64, 6f64, 6f64, 6f64);
        let tp = coefs.log_transitions(*b"NA", &snr).unwrap();
        assert!(close(tp.branch, -3.2866373), "{:?}", tp);
        assert!(close(tp.del, -2.7102493), "{:?}", tp);
        assert!(close(tp.mat, -0.1375533), "{:?}", tp);
        assert!(close(tp.stick, -3.7044989), "{:?}", tp);
        let snr = Snr::new(0f64, 8f64, 0f64, 0f64);
        let tp = coefs.log_transitions(*b"NC", &snr).unwrap();
        assert!(close(tp.branch, -3.63717488), "{:?}", tp);
        assert!(close(tp.del, -3.55678567), "{:?}", tp);
        assert!(close(tp.mat, -0.09390532), "{:?}", tp);
        assert!(close(tp.stick, -3.35888384), "{:?}", tp);
    }
    #[test]
    fn mixed_context_is_generic() {
        let coefs = ContextCoefficients::builtin();
        let snr = Snr::default();
        let xa = coefs.log_transitions(*b"GA", &snr).unwrap();
        let na = coefs.log_transitions(*b"NA", &snr).unwrap();
        assert_eq!(xa, na);
        let aa = coefs.log_transitions(*b"AA", &snr).unwrap();
        assert_ne!(aa, na);
    }
    #[test]
    fn normalized() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4234);
        let coefs = ContextCoefficients::default();
        for _ in 0..50 {
            let snr = Snr::new(
                rng.gen_range(3f64..15f64),
                rng.gen_range(3f64..15f64),
                rng.gen_range(3f64..15f64),
                rng.gen_range(3f64..15f64),
            );
            let params = ContextParameters::new(&coefs, snr).unwrap();
            for &[x, y] in CONTEXTS.iter().filter(|c| c[0] != b'N') {
                let total = params.get(x, y).unwrap().total();
                assert!((total - 1f64).abs() < 1e-10, "{}", total);
            }
            for &context in CONTEXTS.iter() {
                let lp = coefs.log_transitions(context, &snr).unwrap();
                assert!(lp.log_total().abs() < 1e-10);
            }
        }
    }
    #[test]
    fn unknown_context() {
        let coefs = ContextCoefficients::builtin();
        let snr = Snr::default();
        assert!(matches!(
            coefs.log_transitions(*b"AN", &snr),
            Err(ScoringError::UnknownContext { .. })
        ));
        let params = ContextParameters::new(coefs, snr).unwrap();
        assert!(params.get(b'A', b'M').is_err());
        assert!(params.get(b'C', b'G').is_ok());
    }
    #[test]
    fn alphabet() {
        assert!(b"ACGT".iter().all(|&b| is_template_base(b)));
        assert!(!is_template_base(b'N'));
        assert!(is_read_base(b'N') && is_read_base(b'M'));
        assert!(!is_read_base(b'a') && !is_read_base(b'-'));
    }
}
