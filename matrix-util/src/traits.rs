use crate::common_io::Delimiter;
use rand::Rng;

/// Column-wise scaling and row-wise summaries of a genes x samples
/// matrix
pub trait MatOps {
    type Mat;
    type Scalar;

    /// Divide each column by its sample standard deviation. The mean
    /// is left in place. Columns with zero deviation are untouched.
    fn scale_columns_inplace(&mut self);
    fn scale_columns(&self) -> Self::Mat;

    /// Divide each column by its sum (zero-sum columns untouched)
    fn sum_to_one_columns_inplace(&mut self);
    fn sum_to_one_columns(&self) -> Self::Mat;

    /// Unbiased sample variance of every row
    fn row_variances(&self) -> Vec<Self::Scalar>;

    /// Average of the selected columns, one value per row
    fn mean_of_columns(&self, columns: &[usize]) -> Vec<Self::Scalar>;
}

/// Operations to sample random matrices from an explicit random
/// source, so that every draw is reproducible under a fixed seed
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif_with<R: Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;

    /// Sample a matrix from a gamma distribution with `param` is
    /// `(shape α, scale θ)`
    ///
    /// $$f(x|\alpha,\theta) = \frac{\theta^{-\alpha}}{\Gamma(\alpha)} x^{\alpha - 1} e^{-x/\theta}$$
    fn rgamma_with<R: Rng + ?Sized>(
        dd: usize,
        nn: usize,
        param: (f64, f64),
        rng: &mut R,
    ) -> anyhow::Result<Self::Mat>;
}

/// A matrix with row and column names
pub struct MatWithNames<M> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: M,
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    /// Read a headerless numeric matrix
    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    /// Read a matrix whose first line names the columns and whose
    /// first field on every other line names the row
    fn read_names_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn write_names_delim(
        &self,
        rows: &[Box<str>],
        cols: &[Box<str>],
        file: &str,
        delim: &str,
    ) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }

    fn to_tsv_with_names(
        &self,
        rows: &[Box<str>],
        cols: &[Box<str>],
        tsv_file: &str,
    ) -> anyhow::Result<()> {
        self.write_names_delim(rows, cols, tsv_file, "\t")
    }

    fn to_csv(&self, csv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(csv_file, ",")
    }
}
