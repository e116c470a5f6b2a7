
mod pipeline_test;
