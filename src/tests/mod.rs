mod helpers;
mod index_calculation;
